//! HTTP client for Whisper-compatible transcription endpoints.
//!
//! Posts the canonical WAV payload as a multipart form. Works against any
//! OpenAI-compatible `/audio/transcriptions` route; the default endpoint is
//! Groq's hosted Whisper.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

use super::{TranscribeRequest, Transcriber};
use crate::audio::WavBlob;
use crate::error::TranscriptionError;

/// Default Whisper-compatible transcriptions endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/audio/transcriptions";

#[derive(Debug, Clone)]
pub struct HttpTranscriberConfig {
    pub endpoint: String,
    pub api_key: String,
    /// Name of the environment variable the key came from, for error
    /// messages when it is missing.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for HttpTranscriberConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: String::new(),
            api_key_env: "GROQ_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Successful response body (only the text field is consumed).
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Provider error response body.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Transcription client over a shared HTTP connection pool.
///
/// Constructed once by the application entry point and injected wherever a
/// `Transcriber` is needed; there is deliberately no global instance.
pub struct HttpTranscriber {
    http: Client,
    config: HttpTranscriberConfig,
}

impl HttpTranscriber {
    pub fn new(config: HttpTranscriberConfig) -> Result<Self, TranscriptionError> {
        if config.api_key.is_empty() {
            return Err(TranscriptionError::MissingApiKey(config.api_key_env));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TranscriptionError::Network(e.to_string()))?;

        Ok(Self { http, config })
    }
}

#[async_trait::async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(
        &self,
        audio: &WavBlob,
        request: &TranscribeRequest,
    ) -> Result<String, TranscriptionError> {
        debug!(
            "Transcribing {:.2}s utterance ({} bytes)",
            audio.duration_seconds(),
            audio.data.len()
        );

        let file_part = Part::bytes(audio.data.clone())
            .file_name("audio.wav")
            .mime_str(WavBlob::MIME_TYPE)
            .map_err(|e| TranscriptionError::Parse(e.to_string()))?;

        let form = Form::new()
            .part("file", file_part)
            .text("model", request.model.clone())
            .text("language", request.language.clone())
            .text("temperature", request.temperature.to_string());

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptionError::Network(e.to_string()))?;

        let status = response.status();

        if status.is_success() {
            let body: TranscriptionResponse = response
                .json()
                .await
                .map_err(|e| TranscriptionError::Parse(e.to_string()))?;

            debug!("Transcription complete: {} chars", body.text.len());
            Ok(body.text)
        } else {
            let error_text = response.text().await.unwrap_or_default();

            let message =
                if let Ok(parsed) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                    parsed.error.message
                } else {
                    error_text
                };

            error!("Transcription provider error ({}): {}", status.as_u16(), message);

            Err(TranscriptionError::Provider {
                status: status.as_u16(),
                message,
            })
        }
    }
}
