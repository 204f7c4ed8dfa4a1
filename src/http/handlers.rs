use super::state::{AppState, CaptureHandle};
use crate::capture::{CaptureStats, RecorderConfig, UtteranceRecorder};
use crate::error::CaptureError;
use crate::sink::{FanoutSink, MemorySink, NatsSink, TranscriptSegment, TranscriptSink};
use crate::transcribe::TranscriptFilter;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartCaptureRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartCaptureResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopCaptureResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
    pub stats: CaptureStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /capture/start
/// Start a new capture session
pub async fn start_capture(
    State(state): State<AppState>,
    Json(req): Json<StartCaptureRequest>,
) -> impl IntoResponse {
    // Generate or use provided session ID
    let session_id = req
        .session_id
        .unwrap_or_else(|| format!("capture-{}", uuid::Uuid::new_v4()));

    info!("Starting capture for session: {}", session_id);

    // Check if already capturing
    {
        let sessions = state.sessions.read().await;
        if sessions.contains_key(&session_id) {
            return (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: format!("Session {} is already capturing", session_id),
                }),
            )
                .into_response();
        }
    }

    // Assemble the transcript sink: always accumulate in memory, and also
    // publish to NATS when the transport is enabled.
    let transcript = MemorySink::new();
    let sink: Arc<dyn TranscriptSink> = if state.config.nats.enabled {
        match NatsSink::connect(&state.config.nats.url, session_id.clone()).await {
            Ok(nats) => Arc::new(FanoutSink::new(vec![
                Arc::new(transcript.clone()) as Arc<dyn TranscriptSink>,
                Arc::new(nats) as Arc<dyn TranscriptSink>,
            ])),
            Err(e) => {
                error!("Failed to connect transcript transport: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: format!("Failed to connect transcript transport: {}", e),
                    }),
                )
                    .into_response();
            }
        }
    } else {
        Arc::new(transcript.clone())
    };

    let recorder = Arc::new(UtteranceRecorder::new(
        Arc::clone(&state.provider),
        crate::audio::AudioNormalizer::new(state.config.normalize.resolve()),
        Arc::clone(&state.transcriber),
        TranscriptFilter::new(state.config.filter.clone()),
        sink,
        RecorderConfig {
            session_id: session_id.clone(),
            constraints: state.config.capture.constraints(),
            silence: state.config.silence.resolve(),
            request: state.config.transcription.request(),
        },
    ));

    // Start capturing
    if let Err(e) = recorder.start().await {
        error!("Failed to start capture: {}", e);
        let status = match e {
            CaptureError::Unavailable(_) | CaptureError::NoAudioTrack => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CaptureError::StreamLost(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        return (
            status,
            Json(ErrorResponse {
                error: format!("Failed to start capture: {}", e),
            }),
        )
            .into_response();
    }

    // Store session
    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(
            session_id.clone(),
            CaptureHandle {
                recorder,
                transcript,
            },
        );
    }

    info!("Capture started successfully for session: {}", session_id);

    (
        StatusCode::OK,
        Json(StartCaptureResponse {
            session_id: session_id.clone(),
            status: "capturing".to_string(),
            message: format!("Capture started for session {}", session_id),
        }),
    )
        .into_response()
}

/// POST /capture/stop/:session_id
/// Stop a capture session
pub async fn stop_capture(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Stopping capture for session: {}", session_id);

    // Find and remove session
    let handle = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&session_id)
    };

    match handle {
        Some(handle) => {
            let stats = handle.recorder.stop().await;
            info!("Capture stopped successfully for session: {}", session_id);
            (
                StatusCode::OK,
                Json(StopCaptureResponse {
                    session_id: session_id.clone(),
                    status: "stopped".to_string(),
                    message: "Capture stopped".to_string(),
                    stats,
                }),
            )
                .into_response()
        }
        None => {
            error!("Session {} not found", session_id);
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Session {} not found", session_id),
                }),
            )
                .into_response()
        }
    }
}

/// GET /capture/:session_id/status
/// Get statistics for a capture session
pub async fn get_capture_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(handle) => {
            let stats = handle.recorder.stats().await;
            (StatusCode::OK, Json(stats)).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {} not found", session_id),
            }),
        )
            .into_response(),
    }
}

/// GET /capture/:session_id/transcript
/// Get transcript for a capture session (accumulated so far)
pub async fn get_capture_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(handle) => {
            let transcript: Vec<TranscriptSegment> = handle.transcript.segments().await;
            (StatusCode::OK, Json(transcript)).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {} not found", session_id),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
