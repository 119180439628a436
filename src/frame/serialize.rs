//! Transport-safe serialized frame shape
//!
//! A `SerializedFrame` is a full, self-describing snapshot of a streaming
//! buffer: enough metadata travels with the values that
//! `StreamingBuffer::deserialize` reconstructs an equivalent buffer on the
//! other side of a process boundary, subject to the receiver's own retention
//! policy.

use super::field::{Field, FieldSchema};
use super::packet::{BufferOptions, PacketInfo, PushMode};
use serde::{Deserialize, Serialize};

/// Full frame: a deep-copied snapshot produced by
/// [`StreamingBuffer::serialize`](super::StreamingBuffer::serialize).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedFrame {
    /// Filtered, trimmed fields with their values
    pub fields: Vec<Field>,
    /// The raw input schema the buffer was built from (unfiltered)
    pub schema_fields: Vec<FieldSchema>,
    pub push_mode: PushMode,
    /// Retained row count after trimming
    pub length: usize,
    pub packet_info: PacketInfo,
    /// The retention options the frame was serialized under
    pub options: BufferOptions,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_keys: Vec<String>,
}

impl SerializedFrame {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

#[cfg(test)]
mod tests {
    use crate::frame::{
        BufferOptions, DataPayload, FieldFilter, FieldSchema, FieldType, FrameSchema, Packet,
        StreamingBuffer,
    };
    use serde_json::json;

    fn sample_buffer() -> StreamingBuffer {
        let packet = Packet::new(
            FrameSchema::new(vec![
                FieldSchema::new("time", FieldType::Time),
                FieldSchema::new("value", FieldType::Number),
            ]),
            DataPayload::new(vec![
                vec![json!(100), json!(200), json!(300)],
                vec![json!(1.0), json!(2.0), json!(3.0)],
            ]),
        );
        StreamingBuffer::from_packet(&packet, BufferOptions::with_max_length(10)).unwrap()
    }

    #[test]
    fn test_round_trip_reproduces_fields() {
        let buffer = sample_buffer();
        let frame = buffer.serialize(None, None);
        let restored = StreamingBuffer::deserialize(frame).unwrap();

        assert_eq!(restored.fields(), buffer.fields());
        assert_eq!(restored.len(), buffer.len());
        assert_eq!(restored.packet_info(), buffer.packet_info());
    }

    #[test]
    fn test_round_trip_survives_json() {
        let buffer = sample_buffer();
        let frame = buffer.serialize(None, None);
        let json = serde_json::to_string(&frame).unwrap();
        let back: super::SerializedFrame = serde_json::from_str(&json).unwrap();
        let restored = StreamingBuffer::deserialize(back).unwrap();
        assert_eq!(restored.fields(), buffer.fields());
    }

    #[test]
    fn test_serialize_filters_fields() {
        let buffer = sample_buffer();
        let filter = FieldFilter::new(["value"]);
        let frame = buffer.serialize(Some(&filter), None);

        assert_eq!(frame.fields.len(), 1);
        assert_eq!(frame.fields[0].name(), "value");
        // the raw schema still describes the whole input
        assert_eq!(frame.schema_fields.len(), 2);
    }

    #[test]
    fn test_serialize_honors_smaller_retention() {
        let buffer = sample_buffer();
        let frame = buffer.serialize(None, Some(BufferOptions::with_max_length(1)));
        assert_eq!(frame.length, 1);
        assert_eq!(frame.fields[0].values, vec![json!(300)]);

        let empty = buffer.serialize(None, Some(BufferOptions::with_max_length(0)));
        assert!(empty.is_empty());
        assert!(empty.fields[0].values.is_empty());
    }

    #[test]
    fn test_deserialize_reapplies_local_retention() {
        let buffer = sample_buffer();
        let frame = buffer.serialize(None, None);
        let restored =
            StreamingBuffer::deserialize_with(frame, Some(BufferOptions::with_max_length(2)))
                .unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.fields()[0].values, vec![json!(200), json!(300)]);
    }

    #[test]
    fn test_deserialize_rejects_ragged_frames() {
        let buffer = sample_buffer();
        let mut frame = buffer.serialize(None, None);
        frame.fields[1].values.pop();
        assert!(StreamingBuffer::deserialize(frame).is_err());
    }
}
