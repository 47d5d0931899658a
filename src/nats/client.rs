use std::sync::Arc;

use anyhow::{Context, Result};
use async_nats::Client;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::AudioFrameMessage;
use crate::audio::broadcast::CLIENT_QUEUE_CHUNKS;
use crate::audio::LiveBroadcaster;

pub struct NatsClient {
    client: Client,
    subject: String,
    device: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, subject: String, device: String) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            subject,
            device,
        })
    }

    /// Publish one chunk of little-endian PCM
    pub async fn publish_audio_frame(
        &self,
        pcm_bytes: &[u8],
        sample_rate: u32,
        sequence: u64,
    ) -> Result<()> {
        let message = AudioFrameMessage::new(&self.device, sequence, pcm_bytes, sample_rate);
        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .context("Failed to publish audio frame")?;

        debug!(
            "Published audio frame to {} (seq={}, bytes={})",
            self.subject,
            sequence,
            pcm_bytes.len()
        );

        Ok(())
    }

    /// Register with the live broadcaster and publish every chunk it hands
    /// over until the pipeline drops this client.
    pub fn spawn_forwarder(
        self,
        broadcaster: Arc<LiveBroadcaster>,
        sample_rate: u32,
    ) -> Option<JoinHandle<()>> {
        let mut subscription = broadcaster.subscribe(CLIENT_QUEUE_CHUNKS)?;
        info!(
            "NATS forwarder registered as live client {} on {}",
            subscription.id, self.subject
        );

        Some(tokio::spawn(async move {
            let mut sequence = 0u64;
            while let Some(payload) = subscription.rx.recv().await {
                if let Err(e) = self
                    .publish_audio_frame(&payload, sample_rate, sequence)
                    .await
                {
                    warn!("Failed to publish audio frame to NATS: {}", e);
                    // Continue forwarding even if one publish fails
                }
                sequence += 1;
            }
            info!("NATS forwarder stopped after {} frames", sequence);
        }))
    }
}
