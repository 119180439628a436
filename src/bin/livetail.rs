//! Live channel tail demo
//!
//! Runs a producer and a consumer against the in-process transport and
//! prints every update a view receives. Useful for eyeballing the update
//! cadence and full-frame/delta behavior.
//!
//! ## Usage
//!
//! ```bash
//! FRAMEWIRE_CHANNEL=sensors/demo cargo run --bin livetail
//! ```

use framewire::channel::{ChannelConfig, ChannelRegistry, FrameUpdate, ViewRequest};
use framewire::frame::{BufferOptions, DataPayload, FieldSchema, FieldType, FrameSchema, Packet};
use framewire::transport::{ChannelId, LocalTransport};
use framewire::Result;
use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    framewire::telemetry::init("framewire=debug,livetail=info")?;

    let channel = ChannelId::from(
        std::env::var("FRAMEWIRE_CHANNEL")
            .unwrap_or_else(|_| "sensors/demo".to_string()),
    );
    let transport = Arc::new(LocalTransport::new());
    let registry = ChannelRegistry::new(transport, ChannelConfig::default());

    let mut view = registry
        .view(
            &channel,
            ViewRequest::new(BufferOptions {
                max_length: 20,
                max_delta: 10_000.0,
                ..BufferOptions::default()
            }),
        )
        .await?;
    info!(channel = %channel, key = view.key(), "view attached");

    let producer = tokio::spawn(produce(registry, channel));

    for _ in 0..12 {
        match view.recv().await {
            Some(FrameUpdate::Full { frame, error }) => {
                info!(
                    rows = frame.length,
                    fields = frame.fields.len(),
                    error = ?error,
                    "full frame"
                );
            }
            Some(FrameUpdate::NewValues { values }) => {
                info!(
                    columns = values.len(),
                    rows = values.first().map(Vec::len),
                    "delta"
                );
            }
            None => break,
        }
    }

    producer.abort();
    Ok(())
}

async fn produce(registry: ChannelRegistry, channel: ChannelId) -> Result<()> {
    let schema = FrameSchema::new(vec![
        FieldSchema::new("time", FieldType::Time),
        FieldSchema::new("value", FieldType::Number),
    ]);

    for i in 0..u64::MAX {
        let time = 1000 * i as i64;
        let value = (i as f64 / 3.0).sin();
        let data = DataPayload::new(vec![vec![json!(time)], vec![json!(value)]]);
        let packet = if i == 0 {
            Packet::new(schema.clone(), data)
        } else {
            Packet::data_only(data)
        };
        let payload = Bytes::from(serde_json::to_vec(&packet)?);
        registry.publish(&channel, payload).await?;
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    Ok(())
}
