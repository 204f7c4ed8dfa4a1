//! Transcript delivery
//!
//! A `TranscriptSink` receives each finished utterance's text exactly once.
//! Delivery order across concurrently-flushing utterances is not
//! guaranteed; a sink needing strict ordering must sequence on its side.

pub mod nats;

pub use nats::{NatsSink, TranscriptMessage};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// One delivered transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Transcribed text
    pub text: String,

    /// When this segment was delivered
    pub timestamp: DateTime<Utc>,
}

/// Receives finished transcripts, one call per delivered utterance.
#[async_trait::async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn deliver(&self, text: &str) -> Result<()>;
}

/// Accumulates transcripts in memory (status/transcript queries, tests).
#[derive(Clone, Default)]
pub struct MemorySink {
    segments: Arc<Mutex<Vec<TranscriptSegment>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far.
    pub async fn segments(&self) -> Vec<TranscriptSegment> {
        self.segments.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.segments.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.segments.lock().await.is_empty()
    }
}

#[async_trait::async_trait]
impl TranscriptSink for MemorySink {
    async fn deliver(&self, text: &str) -> Result<()> {
        let mut segments = self.segments.lock().await;
        segments.push(TranscriptSegment {
            text: text.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

/// Delivers to several sinks in order; attempts all even if one fails.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TranscriptSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn TranscriptSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait::async_trait]
impl TranscriptSink for FanoutSink {
    async fn deliver(&self, text: &str) -> Result<()> {
        let mut first_err = None;

        for sink in &self.sinks {
            if let Err(e) = sink.deliver(text).await {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
