//! Columnar streaming frames
//!
//! This module owns the data model of the plane:
//! - [`StreamingBuffer`]: the mutable, bounded-retention columnar table
//! - [`Packet`]: one schema+data wire payload
//! - [`SerializedFrame`]: a transport-safe full snapshot
//!
//! Buffers know nothing about channels, subscribers, or transport.

mod buffer;
mod field;
mod packet;
mod serialize;

pub use buffer::StreamingBuffer;
pub use field::{Field, FieldFilter, FieldSchema, FieldType};
pub use packet::{
    BufferOptions, DataPayload, FrameAction, FrameSchema, Packet, PacketInfo, PushMode,
};
pub use serialize::SerializedFrame;
