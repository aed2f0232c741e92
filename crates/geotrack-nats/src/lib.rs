//! NATS JetStream implementation of [`AlertBroker`].
//!
//! Alerts go to a file-backed stream and every publish waits for the
//! server acknowledgement, so a returned `Ok` means the alert is on disk.

use anyhow::{Context, Result};
use async_nats::jetstream::{self, stream::Config as StreamConfig, stream::StorageType};
use async_trait::async_trait;
use geotrack_core::AlertBroker;
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_STREAM: &str = "GEOFENCE_ALERTS";

pub struct NatsAlertBroker {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsAlertBroker {
    /// Connect and make sure `stream_name` exists and captures `topic`.
    pub async fn connect(
        url: &str,
        timeout: Duration,
        stream_name: &str,
        topic: &str,
    ) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis(), "Connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .connect(url)
            .await
            .context("Failed to connect to NATS")?;

        let broker = Self {
            jetstream: jetstream::new(client.clone()),
            client,
        };
        broker.ensure_stream(stream_name, topic).await?;

        info!("Successfully connected to NATS");
        Ok(broker)
    }

    async fn ensure_stream(&self, stream_name: &str, topic: &str) -> Result<()> {
        match self.jetstream.get_stream(stream_name).await {
            Ok(_) => {
                info!(stream = %stream_name, "Stream already exists");
            }
            Err(_) => {
                self.jetstream
                    .create_stream(stream_config(stream_name, topic))
                    .await
                    .context("Failed to create stream")?;
                info!(stream = %stream_name, "Created stream");
            }
        }
        Ok(())
    }

    /// Flush pending publishes before the connection is dropped.
    pub async fn close(&self) -> Result<()> {
        info!("Closing NATS connection");
        self.client.flush().await.context("Failed to flush NATS connection")?;
        Ok(())
    }
}

fn stream_config(stream_name: &str, topic: &str) -> StreamConfig {
    StreamConfig {
        name: stream_name.to_string(),
        subjects: vec![topic.to_string()],
        description: Some("Geofence alerts".to_string()),
        storage: StorageType::File,
        ..Default::default()
    }
}

#[async_trait]
impl AlertBroker for NatsAlertBroker {
    #[instrument(skip(self, payload), fields(subject = %topic, payload_size = payload.len()))]
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let ack = self
            .jetstream
            .publish(topic.to_string(), bytes::Bytes::copy_from_slice(payload))
            .await
            .context("Failed to publish message to JetStream")?;

        ack.await
            .context("Failed to receive JetStream acknowledgment")?;
        Ok(())
    }
}
