//! Speech-to-text transcription
//!
//! The `Transcriber` trait isolates the provider behind an injectable seam
//! so tests can substitute a fake; `HttpTranscriber` talks to any
//! Whisper-compatible transcriptions endpoint.

mod filter;
mod whisper;

pub use filter::{FilterConfig, TranscriptFilter};
pub use whisper::{HttpTranscriber, HttpTranscriberConfig};

use crate::audio::WavBlob;
use crate::error::TranscriptionError;

/// Decoding parameters sent with every transcription request.
#[derive(Debug, Clone)]
pub struct TranscribeRequest {
    pub model: String,
    /// Target language hint (ISO 639-1).
    pub language: String,
    /// Decoding randomness; 0 = deterministic.
    pub temperature: f32,
}

impl Default for TranscribeRequest {
    fn default() -> Self {
        Self {
            model: "whisper-large-v3-turbo".to_string(),
            language: "en".to_string(),
            temperature: 0.0,
        }
    }
}

/// Speech-to-text provider seam.
///
/// An empty string is a valid result (the provider heard no speech); all
/// failures surface as `TranscriptionError` and are local to the utterance.
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: &WavBlob,
        request: &TranscribeRequest,
    ) -> Result<String, TranscriptionError>;
}
