//! Transport adapter contract
//!
//! The plane treats the real connection layer as an opaque collaborator: an
//! event source per channel plus publish/presence calls. Implementations own
//! sockets, reconnects, and retry/backoff; none of that leaks in here.

mod local;

pub use local::LocalTransport;

use crate::frame::Packet;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;

/// Identity of a named, server-multiplexed logical stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Connection state reported by the transport for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Pending,
    Connecting,
    Connected,
    Disconnected,
    /// Terminal: the server has shut the channel down
    Shutdown,
}

/// Raw event delivered by the transport for one channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A schema+data payload
    Message { packet: Packet },
    /// Connection status change; servers may carry the first payload inside
    /// the subscribe acknowledgement
    Status {
        state: ConnectionState,
        error: Option<String>,
        packet: Option<Packet>,
    },
    /// A peer left the channel
    Leave { key: String },
}

/// A client currently present on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub user: String,
    pub connected_at: DateTime<Utc>,
}

/// Presence snapshot for a channel, keyed by client key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceInfo {
    pub clients: BTreeMap<String, ClientInfo>,
}

impl PresenceInfo {
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// The connection layer consumed by the channel plane.
///
/// One `subscribe` call per logical channel; the returned receiver yields
/// events strictly in arrival order and closes on upstream completion.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Opens the upstream subscription for a channel.
    fn subscribe(&self, channel: &ChannelId) -> Result<mpsc::Receiver<ChannelEvent>>;

    /// Tears the upstream subscription down.
    fn unsubscribe(&self, channel: &ChannelId);

    /// Publishes a raw payload to a channel.
    async fn publish(&self, channel: &ChannelId, payload: Bytes) -> Result<()>;

    /// Returns who is currently present on a channel.
    async fn presence(&self, channel: &ChannelId) -> Result<PresenceInfo>;
}
