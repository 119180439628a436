//! # framewire
//!
//! A real-time data plane for streaming columnar data over named channels.
//!
//! Many independent consumers subscribe to a channel over a single shared
//! transport connection and receive compact, schema-aware updates (full
//! frames when the schema changes, minimal row deltas otherwise) instead of
//! repeated snapshots.
//!
//! ## Key pieces
//!
//! - **[`frame::StreamingBuffer`]**: an in-memory columnar table that ingests
//!   schema+data packets, keeps retention bounded by row count and by a
//!   time-delta window, and serializes transport-safe snapshots
//! - **[`channel::ChannelStream`]**: the per-channel multiplexer that fans one
//!   upstream event source out to N views, coalescing updates for consumers
//!   that are temporarily not ready to receive them
//! - **[`channel::ChannelRegistry`]**: lazily opens one upstream subscription
//!   per channel and tears it down only after all subscribers have been gone
//!   for a grace period
//! - **[`transport::TransportAdapter`]**: the contract the real connection
//!   layer implements; [`transport::LocalTransport`] is the in-process one
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use framewire::prelude::*;
//!
//! let transport = Arc::new(LocalTransport::new());
//! let registry = ChannelRegistry::new(transport, ChannelConfig::default());
//!
//! let mut view = registry
//!     .view(&"sensors/temp".into(), ViewRequest::default())
//!     .await?;
//!
//! while let Some(update) = view.recv().await {
//!     match update {
//!         FrameUpdate::Full { frame, .. } => render(frame),
//!         FrameUpdate::NewValues { values } => append(values),
//!     }
//! }
//! ```

pub mod channel;
pub mod frame;
pub mod telemetry;
pub mod transport;

mod error;

pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::channel::{
        ChannelConfig, ChannelRegistry, ChannelStream, FrameStream, FrameUpdate, ViewRequest,
    };
    pub use crate::frame::{
        BufferOptions, FieldFilter, FieldSchema, FieldType, FrameAction, FrameSchema, Packet,
        StreamingBuffer,
    };
    pub use crate::transport::{ChannelId, LocalTransport, TransportAdapter};
    pub use crate::{Error, Result};
}
