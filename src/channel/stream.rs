//! Per-channel multiplexing engine
//!
//! One `ChannelStream` wraps one upstream event source and fans it out to N
//! downstream views. All mutable state (the shared ingest buffer, the view
//! table, the coalescing batch, the grace timer) is owned by a single event
//! loop task; "concurrency" is `select!` interleaving, so buffer state after
//! event *k* is deterministic for a given event sequence.

use super::view::{FrameStream, FrameUpdate, ViewRequest};
use super::ChannelConfig;
use crate::frame::{BufferOptions, FieldFilter, FrameAction, Packet, StreamingBuffer};
use crate::transport::{ChannelEvent, ChannelId, ConnectionState, TransportAdapter};
use crate::{Error, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of a channel stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    /// Created, no packet received yet
    Idle = 0,
    /// Ingesting upstream packets
    Active = 1,
    /// Zero subscribers, grace timer armed
    ShuttingDown = 2,
    /// Disposed; a fresh registry `get` creates a new instance
    Closed = 3,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelState::Idle,
            1 => ChannelState::Active,
            2 => ChannelState::ShuttingDown,
            _ => ChannelState::Closed,
        }
    }
}

pub(crate) enum ViewCommand {
    Attach {
        request: ViewRequest,
        reply: oneshot::Sender<ViewAttachment>,
    },
    Detach {
        view_id: u64,
    },
}

pub(crate) struct ViewAttachment {
    view_id: u64,
    key: String,
    updates: mpsc::Receiver<FrameUpdate>,
}

/// Disposal notice sent to the owning registry.
pub(crate) struct Disposal {
    pub(crate) id: ChannelId,
    pub(crate) instance: u64,
}

/// Handle to one channel's multiplexer.
///
/// Construction immediately subscribes the event loop to the upstream source,
/// so a freshly created channel starts accumulating state before any view
/// attaches.
pub struct ChannelStream {
    id: ChannelId,
    instance: u64,
    state: Arc<AtomicU8>,
    commands: mpsc::UnboundedSender<ViewCommand>,
}

impl ChannelStream {
    /// Creates a standalone channel stream over an upstream event source.
    ///
    /// Must be called within a tokio runtime. Registry-managed streams are
    /// created through [`ChannelRegistry::get`](super::ChannelRegistry::get)
    /// instead.
    pub fn new(
        id: ChannelId,
        events: mpsc::Receiver<ChannelEvent>,
        transport: Arc<dyn TransportAdapter>,
        config: ChannelConfig,
        readiness: watch::Receiver<bool>,
    ) -> Self {
        let (disposals, _) = mpsc::unbounded_channel::<Disposal>();
        Self::spawn(
            id,
            events,
            transport,
            config,
            readiness,
            Arc::new(AtomicU64::new(0)),
            0,
            disposals,
            CancellationToken::new(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn spawn(
        id: ChannelId,
        events: mpsc::Receiver<ChannelEvent>,
        transport: Arc<dyn TransportAdapter>,
        config: ChannelConfig,
        readiness: watch::Receiver<bool>,
        view_keys: Arc<AtomicU64>,
        instance: u64,
        disposals: mpsc::UnboundedSender<Disposal>,
        shutdown: CancellationToken,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(ChannelState::Idle as u8));

        let worker = ChannelWorker {
            id: id.clone(),
            transport,
            buffer: StreamingBuffer::new(config.buffer),
            config,
            views: Vec::new(),
            next_view_id: 0,
            view_keys,
            pending: None,
            ready: true,
            state: state.clone(),
            instance,
            disposals,
        };
        tokio::spawn(worker.run(events, commands_rx, readiness, shutdown));

        Self {
            id,
            instance,
            state,
            commands: commands_tx,
        }
    }

    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    pub(crate) fn instance(&self) -> u64 {
        self.instance
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ChannelState::Closed
    }

    /// Attaches a downstream view and returns its output stream.
    ///
    /// The stream's first emission is always a full frame, regardless of
    /// upstream state. Attaching during the shutdown grace period cancels
    /// the grace timer; the upstream subscription is reused untouched.
    pub async fn view(&self, request: ViewRequest) -> Result<FrameStream> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(ViewCommand::Attach {
                request,
                reply: reply_tx,
            })
            .map_err(|_| Error::ChannelClosed(self.id.to_string()))?;
        let attachment = reply_rx
            .await
            .map_err(|_| Error::ChannelClosed(self.id.to_string()))?;
        Ok(FrameStream::new(
            attachment.key,
            attachment.updates,
            attachment.view_id,
            self.commands.clone(),
        ))
    }
}

impl std::fmt::Debug for ChannelStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelStream")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// One downstream view's bookkeeping inside the event loop.
struct ViewState {
    id: u64,
    key: String,
    filter: Option<FieldFilter>,
    options: BufferOptions,
    replace: bool,
    /// First emission forces a full frame, tracked per view
    first_sent: bool,
    /// Set after an error (or a missed update): next emission resyncs with
    /// a full frame
    force_full: bool,
    tx: mpsc::Sender<FrameUpdate>,
}

/// Upstream events coalesced while the readiness signal is false.
#[derive(Default)]
struct PendingBatch {
    /// Same-schema delta batches, in arrival order
    batches: Vec<Vec<Vec<Value>>>,
    schema_changed: bool,
    /// Last error observed among the buffered events
    error: Option<Arc<Error>>,
}

struct EventOutcome {
    batch: Option<Vec<Vec<Value>>>,
    schema_changed: bool,
    error: Option<Arc<Error>>,
}

struct ChannelWorker {
    id: ChannelId,
    transport: Arc<dyn TransportAdapter>,
    config: ChannelConfig,
    buffer: StreamingBuffer,
    views: Vec<ViewState>,
    next_view_id: u64,
    view_keys: Arc<AtomicU64>,
    pending: Option<PendingBatch>,
    ready: bool,
    state: Arc<AtomicU8>,
    instance: u64,
    disposals: mpsc::UnboundedSender<Disposal>,
}

impl ChannelWorker {
    async fn run(
        mut self,
        mut events: mpsc::Receiver<ChannelEvent>,
        mut commands: mpsc::UnboundedReceiver<ViewCommand>,
        mut readiness: watch::Receiver<bool>,
        shutdown: CancellationToken,
    ) {
        self.ready = *readiness.borrow();
        let mut grace: Option<Instant> = None;
        let mut readiness_alive = true;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        if self.handle_event(event) {
                            break;
                        }
                    }
                    None => {
                        self.complete(None);
                        break;
                    }
                },
                command = commands.recv() => match command {
                    Some(ViewCommand::Attach { request, reply }) => {
                        let attachment = self.attach(request);
                        grace = None;
                        let _ = reply.send(attachment);
                    }
                    Some(ViewCommand::Detach { view_id }) => {
                        self.detach(view_id);
                        if self.views.is_empty() && grace.is_none() {
                            grace = Some(Instant::now() + self.config.shutdown_grace);
                            self.set_state(ChannelState::ShuttingDown);
                            debug!(channel = %self.id, "last view detached, grace timer armed");
                        }
                    }
                    None => {
                        self.dispose("all handles dropped");
                        break;
                    }
                },
                changed = readiness.changed(), if readiness_alive => match changed {
                    Ok(()) => {
                        let ready = *readiness.borrow_and_update();
                        self.set_ready(ready);
                    }
                    Err(_) => readiness_alive = false,
                },
                () = maybe_deadline(grace) => {
                    self.dispose("shutdown grace period elapsed");
                    break;
                }
                () = shutdown.cancelled() => {
                    self.dispose("registry shutdown");
                    break;
                }
            }
        }
    }

    /// Returns true when the event was terminal for this channel.
    fn handle_event(&mut self, event: ChannelEvent) -> bool {
        match event {
            ChannelEvent::Message { mut packet } => {
                self.ingest(&mut packet);
                false
            }
            ChannelEvent::Status {
                state: ConnectionState::Shutdown,
                error,
                ..
            } => {
                self.complete(error.map(|e| Arc::new(Error::Transport(e))));
                true
            }
            ChannelEvent::Status {
                error: Some(error), ..
            } => {
                // connection error, not connection loss: buffer untouched
                self.push_outcome(EventOutcome {
                    batch: None,
                    schema_changed: false,
                    error: Some(Arc::new(Error::Transport(error))),
                });
                false
            }
            ChannelEvent::Status {
                state: ConnectionState::Connected | ConnectionState::Pending,
                packet: Some(mut packet),
                ..
            } => {
                // servers may carry the first payload in the subscribe ack
                self.ingest(&mut packet);
                false
            }
            ChannelEvent::Status { .. } | ChannelEvent::Leave { .. } => false,
        }
    }

    fn ingest(&mut self, packet: &mut Packet) {
        if let Some(hook) = &self.config.packet_hook {
            hook(packet);
        }
        match self.buffer.ingest(packet) {
            Ok(info) => {
                if self.state() == ChannelState::Idle {
                    self.set_state(ChannelState::Active);
                }
                if info.schema_changed {
                    self.push_outcome(EventOutcome {
                        batch: None,
                        schema_changed: true,
                        error: None,
                    });
                } else if info.last_rows > 0 {
                    self.push_outcome(EventOutcome {
                        batch: Some(self.buffer.values_from_last_packet()),
                        schema_changed: false,
                        error: None,
                    });
                }
            }
            Err(e) => {
                warn!(channel = %self.id, error = %e, "packet rejected, buffer frozen at last good state");
                self.push_outcome(EventOutcome {
                    batch: None,
                    schema_changed: false,
                    error: Some(Arc::new(e)),
                });
            }
        }
    }

    fn push_outcome(&mut self, outcome: EventOutcome) {
        if self.views.is_empty() {
            // nothing to coalesce for: a later view starts from a full frame
            return;
        }
        if self.ready {
            let batches: Vec<_> = outcome.batch.into_iter().collect();
            self.emit(&batches, outcome.schema_changed, outcome.error);
        } else {
            let pending = self.pending.get_or_insert_with(PendingBatch::default);
            if let Some(batch) = outcome.batch {
                pending.batches.push(batch);
            }
            if outcome.schema_changed {
                pending.schema_changed = true;
            }
            if let Some(error) = outcome.error {
                pending.error = Some(error);
            }
        }
    }

    fn set_ready(&mut self, ready: bool) {
        if ready == self.ready {
            return;
        }
        self.ready = ready;
        if ready {
            if let Some(pending) = self.pending.take() {
                debug!(
                    channel = %self.id,
                    batches = pending.batches.len(),
                    "readiness restored, releasing coalesced batch"
                );
                self.emit(&pending.batches, pending.schema_changed, pending.error);
            }
        }
    }

    /// Pushes one assembled emission to every view.
    fn emit(
        &mut self,
        batches: &[Vec<Vec<Value>>],
        schema_changed: bool,
        error: Option<Arc<Error>>,
    ) {
        let Self { buffer, views, .. } = self;
        views.retain_mut(|view| {
            let needs_full =
                !view.first_sent || view.force_full || schema_changed || error.is_some();
            let update = if needs_full {
                let retention = if error.is_some() && view.replace {
                    // replace semantics: the last packet is meaningless once
                    // invalidated, so clear downstream state
                    BufferOptions {
                        max_length: 0,
                        ..view.options
                    }
                } else {
                    view.options
                };
                FrameUpdate::Full {
                    frame: buffer.serialize(view.filter.as_ref(), Some(retention)),
                    error: error.clone(),
                }
            } else {
                if batches.is_empty() {
                    return true;
                }
                let values = if view.replace {
                    batches.last().cloned().unwrap_or_default()
                } else {
                    concat_batches(batches)
                };
                FrameUpdate::NewValues {
                    values: filter_columns(buffer, view.filter.as_ref(), values),
                }
            };
            match view.tx.try_send(update) {
                Ok(()) => {
                    view.first_sent = true;
                    view.force_full = error.is_some();
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(key = %view.key, "view queue full, will resync with a full frame");
                    view.force_full = true;
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    fn attach(&mut self, request: ViewRequest) -> ViewAttachment {
        if !self.buffer.has_received() {
            if let Some(mut frame) = request.frame.clone() {
                if let Some(hook) = &self.config.packet_hook {
                    hook(&mut frame);
                }
                match self.buffer.ingest(&frame) {
                    Ok(_) => {
                        self.set_state(ChannelState::Active);
                        debug!(channel = %self.id, "seeded initial frame");
                    }
                    Err(e) => warn!(channel = %self.id, error = %e, "initial frame rejected"),
                }
            }
        }
        self.buffer.resize(&request.buffer);

        let key = request.key.unwrap_or_else(|| {
            format!("view-{}", self.view_keys.fetch_add(1, Ordering::Relaxed))
        });
        let view_id = self.next_view_id;
        self.next_view_id += 1;
        let (tx, rx) = mpsc::channel(self.config.view_capacity);

        if self.state() == ChannelState::ShuttingDown {
            let state = if self.buffer.has_received() {
                ChannelState::Active
            } else {
                ChannelState::Idle
            };
            self.set_state(state);
        }

        self.views.push(ViewState {
            id: view_id,
            key: key.clone(),
            filter: request.filter,
            options: request.buffer,
            replace: request.buffer.action == FrameAction::Replace,
            first_sent: false,
            force_full: false,
            tx,
        });

        if self.ready {
            self.emit_initial(view_id);
        } else {
            // ensure the readiness flip releases this view's first frame
            // even if no further upstream events arrive
            self.pending.get_or_insert_with(PendingBatch::default);
        }

        info!(channel = %self.id, key = %key, views = self.views.len(), "view attached");
        ViewAttachment {
            view_id,
            key,
            updates: rx,
        }
    }

    fn emit_initial(&mut self, view_id: u64) {
        let Self { buffer, views, .. } = self;
        if let Some(view) = views.iter_mut().find(|v| v.id == view_id) {
            let update = FrameUpdate::Full {
                frame: buffer.serialize(view.filter.as_ref(), Some(view.options)),
                error: None,
            };
            if view.tx.try_send(update).is_ok() {
                view.first_sent = true;
            }
        }
    }

    fn detach(&mut self, view_id: u64) {
        let before = self.views.len();
        self.views.retain(|v| v.id != view_id);
        if self.views.len() != before {
            debug!(channel = %self.id, views = self.views.len(), "view detached");
        }
    }

    /// Terminal completion: one final error frame (if any), then every view's
    /// stream ends and the channel is released.
    fn complete(&mut self, error: Option<Arc<Error>>) {
        match &error {
            Some(e) => {
                warn!(channel = %self.id, error = %e, "upstream terminated with error");
                self.emit(&[], false, error.clone());
            }
            None => info!(channel = %self.id, "upstream completed"),
        }
        self.dispose("upstream terminated");
    }

    fn dispose(&mut self, reason: &str) {
        self.set_state(ChannelState::Closed);
        self.views.clear();
        self.pending = None;
        self.transport.unsubscribe(&self.id);
        let _ = self.disposals.send(Disposal {
            id: self.id.clone(),
            instance: self.instance,
        });
        info!(channel = %self.id, reason, "channel stream disposed");
    }

    fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ChannelState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

async fn maybe_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn concat_batches(batches: &[Vec<Vec<Value>>]) -> Vec<Vec<Value>> {
    let mut iter = batches.iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };
    let mut out = first.clone();
    for batch in iter {
        for (column, extra) in out.iter_mut().zip(batch) {
            column.extend(extra.iter().cloned());
        }
    }
    out
}

fn filter_columns(
    buffer: &StreamingBuffer,
    filter: Option<&FieldFilter>,
    columns: Vec<Vec<Value>>,
) -> Vec<Vec<Value>> {
    let Some(filter) = filter else {
        return columns;
    };
    buffer
        .fields()
        .iter()
        .zip(columns)
        .filter(|(field, _)| filter.matches(&field.schema))
        .map(|(_, column)| column)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{DataPayload, FieldSchema, FieldType, FrameSchema};
    use crate::transport::LocalTransport;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    fn schema_packet(times: &[i64], values: &[f64]) -> Packet {
        Packet::new(
            FrameSchema::new(vec![
                FieldSchema::new("time", FieldType::Time),
                FieldSchema::new("value", FieldType::Number),
            ]),
            DataPayload::new(vec![
                times.iter().map(|t| json!(t)).collect(),
                values.iter().map(|v| json!(v)).collect(),
            ]),
        )
    }

    fn data_packet(times: &[i64], values: &[f64]) -> Packet {
        Packet::data_only(DataPayload::new(vec![
            times.iter().map(|t| json!(t)).collect(),
            values.iter().map(|v| json!(v)).collect(),
        ]))
    }

    struct Harness {
        events: mpsc::Sender<ChannelEvent>,
        stream: ChannelStream,
        ready: watch::Sender<bool>,
    }

    fn harness() -> Harness {
        let (events, rx) = mpsc::channel(32);
        let (ready, ready_rx) = watch::channel(true);
        let stream = ChannelStream::new(
            ChannelId::from("test/chan"),
            rx,
            Arc::new(LocalTransport::new()),
            ChannelConfig::default(),
            ready_rx,
        );
        Harness {
            events,
            stream,
            ready,
        }
    }

    async fn next(view: &mut FrameStream) -> FrameUpdate {
        timeout(Duration::from_secs(1), view.recv())
            .await
            .expect("timed out waiting for update")
            .expect("stream ended unexpectedly")
    }

    #[tokio::test]
    async fn test_first_emission_is_full_frame() {
        let h = harness();
        let mut view = h.stream.view(ViewRequest::default()).await.unwrap();

        // full frame immediately, even though nothing has been ingested
        let update = next(&mut view).await;
        let frame = update.frame().expect("expected a full frame");
        assert!(frame.is_empty());
    }

    #[tokio::test]
    async fn test_deltas_after_established_schema() {
        let h = harness();
        let mut view = h.stream.view(ViewRequest::default()).await.unwrap();
        let _initial = next(&mut view).await;

        h.events
            .send(ChannelEvent::Message {
                packet: schema_packet(&[100], &[1.0]),
            })
            .await
            .unwrap();
        // first schema is a structural change: full frame
        let update = next(&mut view).await;
        assert!(update.is_full());

        h.events
            .send(ChannelEvent::Message {
                packet: data_packet(&[200], &[2.0]),
            })
            .await
            .unwrap();
        match next(&mut view).await {
            FrameUpdate::NewValues { values } => {
                assert_eq!(values, vec![vec![json!(200)], vec![json!(2.0)]]);
            }
            other => panic!("expected delta, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_with_payload_acts_as_message() {
        let h = harness();
        let mut view = h.stream.view(ViewRequest::default()).await.unwrap();
        let _initial = next(&mut view).await;

        h.events
            .send(ChannelEvent::Status {
                state: ConnectionState::Connected,
                error: None,
                packet: Some(schema_packet(&[100], &[1.0])),
            })
            .await
            .unwrap();

        let update = next(&mut view).await;
        let frame = update.frame().expect("expected a full frame");
        assert_eq!(frame.length, 1);
    }

    #[tokio::test]
    async fn test_connection_error_carries_last_good_data() {
        let h = harness();
        let mut view = h.stream.view(ViewRequest::default()).await.unwrap();
        let _initial = next(&mut view).await;

        h.events
            .send(ChannelEvent::Message {
                packet: schema_packet(&[100], &[1.0]),
            })
            .await
            .unwrap();
        let _full = next(&mut view).await;

        h.events
            .send(ChannelEvent::Status {
                state: ConnectionState::Disconnected,
                error: Some("connection reset".to_string()),
                packet: None,
            })
            .await
            .unwrap();

        let update = next(&mut view).await;
        assert!(update.error().is_some());
        let frame = update.frame().expect("expected a full frame");
        assert_eq!(frame.length, 1, "last-good data stays attached");

        // recovery after the error is a full frame, not a delta
        h.events
            .send(ChannelEvent::Message {
                packet: data_packet(&[200], &[2.0]),
            })
            .await
            .unwrap();
        let update = next(&mut view).await;
        assert!(update.is_full());
        assert!(update.error().is_none());
    }

    #[tokio::test]
    async fn test_replace_view_gets_empty_frame_on_error() {
        let h = harness();
        let request = ViewRequest::new(BufferOptions {
            max_length: 10,
            max_delta: f64::INFINITY,
            action: FrameAction::Replace,
        });
        let mut view = h.stream.view(request).await.unwrap();
        let _initial = next(&mut view).await;

        h.events
            .send(ChannelEvent::Message {
                packet: schema_packet(&[100], &[1.0]),
            })
            .await
            .unwrap();
        let _full = next(&mut view).await;

        h.events
            .send(ChannelEvent::Status {
                state: ConnectionState::Disconnected,
                error: Some("gone".to_string()),
                packet: None,
            })
            .await
            .unwrap();

        let update = next(&mut view).await;
        assert!(update.error().is_some());
        assert!(update.frame().unwrap().is_empty(), "replace views discard state on error");
    }

    #[tokio::test]
    async fn test_readiness_coalesces_deltas() {
        let h = harness();
        let mut view = h.stream.view(ViewRequest::default()).await.unwrap();
        let _initial = next(&mut view).await;

        h.events
            .send(ChannelEvent::Message {
                packet: schema_packet(&[100], &[1.0]),
            })
            .await
            .unwrap();
        let _full = next(&mut view).await;

        h.ready.send(false).unwrap();
        // let the worker observe the flip before queuing data
        tokio::time::sleep(Duration::from_millis(20)).await;

        for i in 0..3 {
            h.events
                .send(ChannelEvent::Message {
                    packet: data_packet(&[200 + i], &[2.0 + i as f64]),
                })
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.ready.send(true).unwrap();

        // exactly one emission, the concatenation of all three batches
        match next(&mut view).await {
            FrameUpdate::NewValues { values } => {
                assert_eq!(values[0], vec![json!(200), json!(201), json!(202)]);
            }
            other => panic!("expected coalesced delta, got {:?}", other),
        }
        assert!(
            timeout(Duration::from_millis(50), view.recv()).await.is_err(),
            "no further emission expected"
        );
    }

    #[tokio::test]
    async fn test_upstream_error_status_is_terminal_on_shutdown() {
        let h = harness();
        let mut view = h.stream.view(ViewRequest::default()).await.unwrap();
        let _initial = next(&mut view).await;

        h.events
            .send(ChannelEvent::Status {
                state: ConnectionState::Shutdown,
                error: Some("server going away".to_string()),
                packet: None,
            })
            .await
            .unwrap();

        // one final error frame, then completion
        let update = next(&mut view).await;
        assert!(update.error().is_some());
        assert!(
            timeout(Duration::from_secs(1), view.recv()).await.unwrap().is_none(),
            "stream completes after terminal error"
        );
        assert!(h.stream.is_closed());
    }

    #[tokio::test]
    async fn test_upstream_completion_closes_stream() {
        let h = harness();
        let mut view = h.stream.view(ViewRequest::default()).await.unwrap();
        let _initial = next(&mut view).await;

        drop(h.events);
        assert!(
            timeout(Duration::from_secs(1), view.recv()).await.unwrap().is_none()
        );
        assert!(h.stream.is_closed());
    }

    #[tokio::test]
    async fn test_view_on_closed_channel_fails() {
        let h = harness();
        drop(h.events);
        tokio::time::sleep(Duration::from_millis(20)).await;

        // worker has exited; attach must fail cleanly
        let err = h.stream.view(ViewRequest::default()).await;
        assert!(err.is_err());
    }
}
