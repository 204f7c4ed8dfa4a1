use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::capture::{CaptureProvider, UtteranceRecorder};
use crate::config::Config;
use crate::sink::MemorySink;
use crate::transcribe::Transcriber;

/// One live capture session and its accumulated transcript.
#[derive(Clone)]
pub struct CaptureHandle {
    pub recorder: Arc<UtteranceRecorder>,
    pub transcript: MemorySink,
}

/// Shared application state for HTTP handlers.
///
/// The capture provider and transcription client are injected once at
/// startup; handlers only assemble them into recorders.
#[derive(Clone)]
pub struct AppState {
    /// Active capture sessions (session_id → handle)
    pub sessions: Arc<RwLock<HashMap<String, CaptureHandle>>>,
    pub provider: Arc<dyn CaptureProvider>,
    pub transcriber: Arc<dyn Transcriber>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn CaptureProvider>,
        transcriber: Arc<dyn Transcriber>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            provider,
            transcriber,
            config,
        }
    }
}
