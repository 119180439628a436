//! Wire packets and buffer retention options
//!
//! A packet is one schema+data payload as delivered by the transport:
//! `{ schema?: { fields: [...] }, data?: { values: [[...], ...] } }` with one
//! value array per field, positionally aligned.

use super::field::FieldSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema half of a packet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameSchema {
    pub fields: Vec<FieldSchema>,
}

impl FrameSchema {
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self { fields }
    }
}

/// Data half of a packet: one value array per schema field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataPayload {
    pub values: Vec<Vec<Value>>,
}

impl DataPayload {
    pub fn new(values: Vec<Vec<Value>>) -> Self {
        Self { values }
    }

    /// Row count, padding-aware: the longest column wins.
    pub fn rows(&self) -> usize {
        self.values.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// One schema+data payload ingested by a streaming buffer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Packet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<FrameSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DataPayload>,
}

impl Packet {
    pub fn schema_only(schema: FrameSchema) -> Self {
        Self {
            schema: Some(schema),
            data: None,
        }
    }

    pub fn data_only(data: DataPayload) -> Self {
        Self {
            schema: None,
            data: Some(data),
        }
    }

    pub fn new(schema: FrameSchema, data: DataPayload) -> Self {
        Self {
            schema: Some(schema),
            data: Some(data),
        }
    }
}

/// How a buffer (or a view) applies incoming rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameAction {
    #[default]
    Append,
    Replace,
}

/// Retention window bounding how much history a buffer keeps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferOptions {
    /// Maximum retained row count
    pub max_length: usize,
    /// Maximum span of the first time field's values, in the time field's
    /// own unit (unbounded by default; omitted from JSON when unbounded)
    #[serde(default = "unbounded_delta", skip_serializing_if = "delta_is_unbounded")]
    pub max_delta: f64,
    #[serde(default)]
    pub action: FrameAction,
}

fn unbounded_delta() -> f64 {
    f64::INFINITY
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn delta_is_unbounded(delta: &f64) -> bool {
    delta.is_infinite()
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            max_length: 1000,
            max_delta: f64::INFINITY,
            action: FrameAction::Append,
        }
    }
}

impl BufferOptions {
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            ..Self::default()
        }
    }
}

/// Describes the most recent ingest applied to a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PacketInfo {
    /// Ingest sequence number, starting at 1 for the first packet
    pub number: u64,
    /// Whether the last packet replaced or appended
    pub action: FrameAction,
    /// Rows contributed by the last packet, in the buffer's wide layout
    pub last_rows: usize,
    /// Whether the last packet structurally changed the schema
    pub schema_changed: bool,
}

/// Column layout mode, decided at schema-ingest time.
///
/// Label expansion is selected when the first field is a string field named
/// `labels` immediately followed by a time field; each distinct label value
/// then grows a parallel block of value fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushMode {
    #[default]
    Wide,
    #[serde(rename = "labels")]
    LabelExpansion,
}
