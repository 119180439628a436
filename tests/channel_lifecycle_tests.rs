//! Integration tests for channel lifecycle and registry behavior
//!
//! Covers the shutdown grace period, registry memoization and pruning,
//! terminal upstream errors, and publish/presence delegation.

use framewire::channel::{ChannelConfig, ChannelRegistry, ViewRequest};
use framewire::frame::{DataPayload, FieldSchema, FieldType, FrameSchema, Packet};
use framewire::transport::{ChannelEvent, ChannelId, ConnectionState, LocalTransport};
use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn registry_with_grace(grace: Duration) -> (Arc<LocalTransport>, ChannelRegistry) {
    let transport = Arc::new(LocalTransport::new());
    let config = ChannelConfig {
        shutdown_grace: grace,
        ..ChannelConfig::default()
    };
    (transport.clone(), ChannelRegistry::new(transport, config))
}

fn sample_packet() -> Packet {
    Packet::new(
        FrameSchema::new(vec![
            FieldSchema::new("time", FieldType::Time),
            FieldSchema::new("value", FieldType::Number),
        ]),
        DataPayload::new(vec![vec![json!(100)], vec![json!(1.0)]]),
    )
}

#[tokio::test]
async fn test_resubscribe_within_grace_keeps_upstream() {
    let (transport, registry) = registry_with_grace(Duration::from_millis(200));
    let id = ChannelId::from("metrics/cpu");

    let stream = registry.get(&id).unwrap();
    let view = stream.view(ViewRequest::default()).await.unwrap();
    assert_eq!(transport.subscriber_count(&id), 1);

    drop(view);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // resubscription during the grace period cancels the timer; from the
    // upstream's perspective nothing happened
    let _view = stream.view(ViewRequest::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(!stream.is_closed());
    assert_eq!(transport.subscriber_count(&id), 1, "no transport churn");
}

#[tokio::test]
async fn test_grace_expiry_disposes_and_fresh_get_reconnects() {
    let (transport, registry) = registry_with_grace(Duration::from_millis(100));
    let id = ChannelId::from("metrics/cpu");

    let stream = registry.get(&id).unwrap();
    let view = stream.view(ViewRequest::default()).await.unwrap();

    drop(view);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(stream.is_closed());
    assert_eq!(transport.subscriber_count(&id), 0);

    // the registry pruned the closed instance; a fresh get reconnects
    let fresh = registry.get(&id).unwrap();
    assert!(!fresh.is_closed());
    assert_eq!(transport.subscriber_count(&id), 1);
}

#[tokio::test]
async fn test_channel_accumulates_before_any_view() {
    let (transport, registry) = registry_with_grace(Duration::from_millis(200));
    let id = ChannelId::from("metrics/cpu");

    // construction subscribes immediately; state accumulates with no views
    let stream = registry.get(&id).unwrap();
    transport.emit(
        &id,
        ChannelEvent::Message {
            packet: sample_packet(),
        },
    );
    tokio::time::sleep(Duration::from_millis(30)).await;

    let mut view = stream.view(ViewRequest::default()).await.unwrap();
    let update = timeout(Duration::from_secs(1), view.recv())
        .await
        .unwrap()
        .unwrap();
    let frame = update.frame().expect("first emission is a full frame");
    assert_eq!(frame.length, 1, "pre-view packet retained");
}

#[tokio::test]
async fn test_terminal_shutdown_releases_channel() {
    let (transport, registry) = registry_with_grace(Duration::from_millis(200));
    let id = ChannelId::from("metrics/cpu");

    let stream = registry.get(&id).unwrap();
    let mut view = stream.view(ViewRequest::default()).await.unwrap();
    let _initial = timeout(Duration::from_secs(1), view.recv()).await.unwrap();

    transport.emit(
        &id,
        ChannelEvent::Status {
            state: ConnectionState::Shutdown,
            error: Some("server shutdown".to_string()),
            packet: None,
        },
    );

    // final error frame, then completion
    let update = timeout(Duration::from_secs(1), view.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(update.error().is_some());
    assert!(timeout(Duration::from_secs(1), view.recv())
        .await
        .unwrap()
        .is_none());

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(stream.is_closed());

    // the terminal instance is gone; get starts a brand-new one
    let fresh = registry.get(&id).unwrap();
    assert!(!fresh.is_closed());
}

#[tokio::test]
async fn test_publish_round_trips_through_transport() {
    let (_transport, registry) = registry_with_grace(Duration::from_millis(200));
    let id = ChannelId::from("metrics/cpu");

    let mut view = registry.view(&id, ViewRequest::default()).await.unwrap();
    let _initial = timeout(Duration::from_secs(1), view.recv()).await.unwrap();

    let payload = Bytes::from(serde_json::to_vec(&sample_packet()).unwrap());
    registry.publish(&id, payload).await.unwrap();

    let update = timeout(Duration::from_secs(1), view.recv())
        .await
        .unwrap()
        .unwrap();
    let frame = update.frame().expect("first schema is a full frame");
    assert_eq!(frame.field("value").unwrap().values, vec![json!(1.0)]);
}

#[tokio::test]
async fn test_presence_delegates_to_transport() {
    let (_transport, registry) = registry_with_grace(Duration::from_millis(200));
    let id = ChannelId::from("metrics/cpu");

    assert!(registry.presence(&id).await.unwrap().is_empty());

    let _stream = registry.get(&id).unwrap();
    let presence = registry.presence(&id).await.unwrap();
    assert_eq!(presence.len(), 1);
}

#[tokio::test]
async fn test_two_channels_are_independent() {
    let (transport, registry) = registry_with_grace(Duration::from_millis(200));
    let cpu = ChannelId::from("metrics/cpu");
    let mem = ChannelId::from("metrics/mem");

    let mut cpu_view = registry.view(&cpu, ViewRequest::default()).await.unwrap();
    let mut mem_view = registry.view(&mem, ViewRequest::default()).await.unwrap();
    let _ = timeout(Duration::from_secs(1), cpu_view.recv()).await.unwrap();
    let _ = timeout(Duration::from_secs(1), mem_view.recv()).await.unwrap();

    transport.emit(
        &cpu,
        ChannelEvent::Message {
            packet: sample_packet(),
        },
    );

    assert!(timeout(Duration::from_secs(1), cpu_view.recv())
        .await
        .unwrap()
        .is_some());
    assert!(
        timeout(Duration::from_millis(50), mem_view.recv()).await.is_err(),
        "other channel sees nothing"
    );
}
