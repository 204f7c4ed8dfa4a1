use anyhow::{Context, Result};
use async_nats::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use super::TranscriptSink;

/// Transcript message published to NATS, one per delivered utterance.
///
/// Utterances may finish transcription out of capture order; `sequence`
/// reflects delivery order at this sink, so a consumer that needs strict
/// ordering can reorder on it.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    pub sequence: u64,
    pub text: String,
    pub timestamp: String, // RFC3339 timestamp
}

/// Publishes each transcript to a per-session NATS subject (the chat
/// transport consumed by downstream assistant services).
pub struct NatsSink {
    client: Client,
    session_id: String,
    sequence: AtomicU64,
}

impl NatsSink {
    /// Connect to NATS server
    pub async fn connect(url: &str, session_id: String) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            session_id,
            sequence: AtomicU64::new(0),
        })
    }

    fn subject(&self) -> String {
        format!("chat.transcript.{}", self.session_id)
    }
}

#[async_trait::async_trait]
impl TranscriptSink for NatsSink {
    async fn deliver(&self, text: &str) -> Result<()> {
        let subject = self.subject();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);

        let message = TranscriptMessage {
            session_id: self.session_id.clone(),
            sequence,
            text: text.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish transcript")?;

        info!(
            "Published transcript to {} (sequence={}, chars={})",
            subject,
            sequence,
            text.len()
        );

        Ok(())
    }
}
