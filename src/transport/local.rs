//! In-process transport adapter
//!
//! Fans published packets out to every subscriber of a channel inside one
//! process. Used by tests and by embeddings that run producers and consumers
//! together; the contract matches what a real remote transport provides.

use super::{
    ChannelEvent, ChannelId, ClientInfo, ConnectionState, PresenceInfo, TransportAdapter,
};
use crate::frame::Packet;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

struct LocalSubscriber {
    key: String,
    connected_at: chrono::DateTime<Utc>,
    tx: mpsc::Sender<ChannelEvent>,
}

/// In-process [`TransportAdapter`].
pub struct LocalTransport {
    channels: Mutex<HashMap<ChannelId, Vec<LocalSubscriber>>>,
    next_client: AtomicU64,
    capacity: usize,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Creates a transport whose per-subscriber event queues hold `capacity`
    /// undelivered events before new ones are dropped.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            next_client: AtomicU64::new(0),
            capacity,
        }
    }

    /// Injects a raw event into a channel, as a server would.
    pub fn emit(&self, channel: &ChannelId, event: ChannelEvent) {
        let mut channels = self.channels.lock();
        let Some(subscribers) = channels.get_mut(channel) else {
            debug!(channel = %channel, "emit on channel with no subscribers");
            return;
        };
        subscribers.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(channel = %channel, key = %sub.key, "subscriber queue full, dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Completes a channel: every subscriber's event stream ends.
    pub fn complete(&self, channel: &ChannelId) {
        self.channels.lock().remove(channel);
    }

    /// Number of live subscriptions on a channel.
    pub fn subscriber_count(&self, channel: &ChannelId) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportAdapter for LocalTransport {
    fn subscribe(&self, channel: &ChannelId) -> Result<mpsc::Receiver<ChannelEvent>> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let key = format!("client-{}", self.next_client.fetch_add(1, Ordering::Relaxed));

        // ack the subscription the way a server would
        let _ = tx.try_send(ChannelEvent::Status {
            state: ConnectionState::Connected,
            error: None,
            packet: None,
        });

        debug!(channel = %channel, key = %key, "local subscribe");
        self.channels
            .lock()
            .entry(channel.clone())
            .or_default()
            .push(LocalSubscriber {
                key,
                connected_at: Utc::now(),
                tx,
            });
        Ok(rx)
    }

    fn unsubscribe(&self, channel: &ChannelId) {
        debug!(channel = %channel, "local unsubscribe");
        self.channels.lock().remove(channel);
    }

    async fn publish(&self, channel: &ChannelId, payload: Bytes) -> Result<()> {
        let packet: Packet = serde_json::from_slice(&payload)
            .map_err(|e| Error::Serialization(format!("publish payload: {}", e)))?;
        self.emit(channel, ChannelEvent::Message { packet });
        Ok(())
    }

    async fn presence(&self, channel: &ChannelId) -> Result<PresenceInfo> {
        let channels = self.channels.lock();
        let mut presence = PresenceInfo::default();
        if let Some(subscribers) = channels.get(channel) {
            for sub in subscribers {
                presence.clients.insert(
                    sub.key.clone(),
                    ClientInfo {
                        user: sub.key.clone(),
                        connected_at: sub.connected_at,
                    },
                );
            }
        }
        Ok(presence)
    }
}
