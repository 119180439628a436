//! View requests and downstream update streams
//!
//! A view is one subscriber's `(filter, retention, mode)` configuration
//! against a shared channel buffer. Views never touch the ingest buffer;
//! they receive deep-copied projections over their own queue.

use super::stream::ViewCommand;
use crate::frame::{BufferOptions, FieldFilter, Packet, SerializedFrame};
use crate::Error;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Parameters for one downstream view of a channel.
#[derive(Debug, Clone, Default)]
pub struct ViewRequest {
    /// Retention and append/replace semantics for this view
    pub buffer: BufferOptions,
    /// Optional field filter; unfiltered views see every field
    pub filter: Option<FieldFilter>,
    /// Optional initial packet; only the first view to attach to a channel
    /// that has never received a packet may seed state this way
    pub frame: Option<Packet>,
    /// Subscription key; minted from the registry's counter when absent
    pub key: Option<String>,
}

impl ViewRequest {
    pub fn new(buffer: BufferOptions) -> Self {
        Self {
            buffer,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: FieldFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_frame(mut self, frame: Packet) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// One downstream update.
#[derive(Debug, Clone)]
pub enum FrameUpdate {
    /// A complete, self-describing snapshot, optionally carrying the error
    /// that forced it
    Full {
        frame: SerializedFrame,
        error: Option<Arc<Error>>,
    },
    /// New rows under the previously established schema, one column per
    /// (filtered) field
    NewValues { values: Vec<Vec<Value>> },
}

impl FrameUpdate {
    pub fn is_full(&self) -> bool {
        matches!(self, FrameUpdate::Full { .. })
    }

    pub fn error(&self) -> Option<&Arc<Error>> {
        match self {
            FrameUpdate::Full { error, .. } => error.as_ref(),
            FrameUpdate::NewValues { .. } => None,
        }
    }

    pub fn frame(&self) -> Option<&SerializedFrame> {
        match self {
            FrameUpdate::Full { frame, .. } => Some(frame),
            FrameUpdate::NewValues { .. } => None,
        }
    }
}

/// The output stream of one view.
///
/// Dropping the stream detaches the view immediately; the channel itself
/// survives for the shutdown grace period.
pub struct FrameStream {
    key: String,
    rx: mpsc::Receiver<FrameUpdate>,
    _guard: ViewGuard,
}

impl FrameStream {
    pub(crate) fn new(
        key: String,
        rx: mpsc::Receiver<FrameUpdate>,
        view_id: u64,
        commands: mpsc::UnboundedSender<ViewCommand>,
    ) -> Self {
        Self {
            key,
            rx,
            _guard: ViewGuard { view_id, commands },
        }
    }

    /// The subscription key this view was attached under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Receives the next update; `None` once the channel has completed.
    pub async fn recv(&mut self) -> Option<FrameUpdate> {
        self.rx.recv().await
    }
}

impl Stream for FrameStream {
    type Item = FrameUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for FrameStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameStream").field("key", &self.key).finish()
    }
}

struct ViewGuard {
    view_id: u64,
    commands: mpsc::UnboundedSender<ViewCommand>,
}

impl Drop for ViewGuard {
    fn drop(&mut self) {
        let _ = self.commands.send(ViewCommand::Detach {
            view_id: self.view_id,
        });
    }
}
