//! Channel multiplexing
//!
//! One [`ChannelStream`] per live channel fans a single upstream event source
//! out to any number of downstream views, each with its own field filter,
//! retention window, and append/replace semantics. The [`ChannelRegistry`]
//! owns the mapping from channel identity to live streams and tears them
//! down after a grace period with no subscribers.

mod registry;
mod stream;
mod view;

pub use registry::ChannelRegistry;
pub use stream::{ChannelState, ChannelStream};
pub use view::{FrameStream, FrameUpdate, ViewRequest};

use crate::frame::{BufferOptions, Packet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Pre-ingest packet hook, e.g. for entity decoding of sentinel values.
pub type PacketHook = Arc<dyn Fn(&mut Packet) + Send + Sync>;

/// Configuration shared by every channel stream a registry creates.
#[derive(Clone)]
pub struct ChannelConfig {
    /// Initial retention of the shared ingest buffer; views grow it
    pub buffer: BufferOptions,
    /// How long a channel survives with zero subscribers before disposing
    pub shutdown_grace: Duration,
    /// Per-view update queue depth; a view that falls this far behind is
    /// resynchronized with a full frame
    pub view_capacity: usize,
    /// Optional hook run on every packet before ingest
    pub packet_hook: Option<PacketHook>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            buffer: BufferOptions::default(),
            shutdown_grace: Duration::from_millis(250),
            view_capacity: 32,
            packet_hook: None,
        }
    }
}

impl fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("buffer", &self.buffer)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("view_capacity", &self.view_capacity)
            .field("packet_hook", &self.packet_hook.as_ref().map(|_| "…"))
            .finish()
    }
}
