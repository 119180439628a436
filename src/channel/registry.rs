//! Channel registry / connection manager
//!
//! Owns the mapping from channel identity to live channel streams: one
//! upstream transport subscription per channel, created lazily on first
//! access and reused by every subsequent caller. Disposed streams are pruned
//! so a future `get` starts a brand-new instance.

use super::stream::{ChannelStream, Disposal};
use super::view::{FrameStream, ViewRequest};
use super::ChannelConfig;
use crate::transport::{ChannelId, PresenceInfo, TransportAdapter};
use crate::Result;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Registry of live channel streams over one transport connection.
///
/// Must be created within a tokio runtime; it spawns a reaper task that
/// prunes disposed channels.
pub struct ChannelRegistry {
    transport: Arc<dyn TransportAdapter>,
    channels: Arc<DashMap<ChannelId, Arc<ChannelStream>>>,
    config: ChannelConfig,
    /// Shared subscriber-readiness signal, one per registry: all channels'
    /// downstream emissions gate on it
    readiness: watch::Sender<bool>,
    /// Counter for synthetic view keys, owned here so tests control it
    view_keys: Arc<AtomicU64>,
    instances: AtomicU64,
    disposals: mpsc::UnboundedSender<Disposal>,
    shutdown: CancellationToken,
}

impl ChannelRegistry {
    pub fn new(transport: Arc<dyn TransportAdapter>, config: ChannelConfig) -> Self {
        let channels: Arc<DashMap<ChannelId, Arc<ChannelStream>>> = Arc::new(DashMap::new());
        let (readiness, _) = watch::channel(true);
        let (disposals, mut disposal_rx) = mpsc::unbounded_channel::<Disposal>();

        let reaper_map = channels.clone();
        tokio::spawn(async move {
            while let Some(disposal) = disposal_rx.recv().await {
                // a newer instance under the same id must survive a stale notice
                let removed = reaper_map
                    .remove_if(&disposal.id, |_, stream| {
                        stream.instance() == disposal.instance
                    })
                    .is_some();
                if removed {
                    debug!(channel = %disposal.id, "pruned disposed channel");
                }
            }
        });

        Self {
            transport,
            channels,
            config,
            readiness,
            view_keys: Arc::new(AtomicU64::new(0)),
            instances: AtomicU64::new(0),
            disposals,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns the live stream for a channel, creating it (and the upstream
    /// transport subscription) on first access. A previously disposed
    /// channel yields a fresh instance.
    pub fn get(&self, id: &ChannelId) -> Result<Arc<ChannelStream>> {
        match self.channels.entry(id.clone()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_closed() {
                    return Ok(entry.get().clone());
                }
                let stream = self.connect(id)?;
                entry.insert(stream.clone());
                Ok(stream)
            }
            Entry::Vacant(entry) => {
                let stream = self.connect(id)?;
                entry.insert(stream.clone());
                Ok(stream)
            }
        }
    }

    /// Convenience: `get` + attach one view.
    pub async fn view(&self, id: &ChannelId, request: ViewRequest) -> Result<FrameStream> {
        self.get(id)?.view(request).await
    }

    /// Flips the shared subscriber-readiness signal. While false, every
    /// channel coalesces updates instead of emitting them.
    pub fn set_ready(&self, ready: bool) {
        self.readiness.send_replace(ready);
    }

    /// Mints a synthetic subscription key from the registry-owned counter.
    pub fn next_view_key(&self) -> String {
        format!("view-{}", self.view_keys.fetch_add(1, Ordering::Relaxed))
    }

    /// Publishes a raw payload; delegates straight to the transport.
    pub async fn publish(&self, id: &ChannelId, payload: Bytes) -> Result<()> {
        self.transport.publish(id, payload).await
    }

    /// Presence lookup; delegates straight to the transport, unbuffered.
    pub async fn presence(&self, id: &ChannelId) -> Result<PresenceInfo> {
        self.transport.presence(id).await
    }

    /// Number of channels currently held (including any not yet pruned).
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Disposes every channel stream. New `get` calls still work and create
    /// fresh instances.
    pub fn shutdown(&self) {
        info!(channels = self.channels.len(), "registry shutdown");
        self.shutdown.cancel();
    }

    fn connect(&self, id: &ChannelId) -> Result<Arc<ChannelStream>> {
        let events = self.transport.subscribe(id)?;
        let instance = self.instances.fetch_add(1, Ordering::Relaxed);
        info!(channel = %id, instance, "opening channel stream");
        Ok(Arc::new(ChannelStream::spawn(
            id.clone(),
            events,
            self.transport.clone(),
            self.config.clone(),
            self.readiness.subscribe(),
            self.view_keys.clone(),
            instance,
            self.disposals.clone(),
            self.shutdown.child_token(),
        )))
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.channels.len())
            .field("config", &self.config)
            .finish()
    }
}
