// Utterance-segmented capture
//
// The recorder owns one capture session end to end: it opens the stream,
// keeps exactly one recording sub-session active while speech is present,
// and on each confirmed silence edge hands the finished sub-session to the
// normalize -> transcribe -> deliver pipeline without waiting for it.
// Capture re-arms immediately, so the stream never has a gap beyond the
// sub-session swap itself.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::provider::{AudioChunk, CaptureProvider, CaptureStream, StreamConstraints};
use super::silence::{spawn_detector, DetectorEvent, SilenceConfig, SilenceEdge};
use crate::audio::{AudioNormalizer, RecordedBlob};
use crate::error::CaptureError;
use crate::sink::TranscriptSink;
use crate::transcribe::{TranscribeRequest, Transcriber, TranscriptFilter};

/// Configuration for one recorder.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Session identifier used in logs and sink messages.
    pub session_id: String,

    /// Constraints passed to the capture provider.
    pub constraints: StreamConstraints,

    /// Silence classification tuning.
    pub silence: SilenceConfig,

    /// Parameters for every transcription request.
    pub request: TranscribeRequest,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            session_id: format!("capture-{}", uuid::Uuid::new_v4()),
            constraints: StreamConstraints::default(),
            silence: SilenceConfig::default(),
            request: TranscribeRequest::default(),
        }
    }
}

/// Statistics about a capture session
#[derive(Debug, Clone, Serialize)]
pub struct CaptureStats {
    /// Whether capture is currently active
    pub is_capturing: bool,

    /// When the session started (None if it never started)
    pub started_at: Option<DateTime<Utc>>,

    /// Total duration in seconds since start
    pub duration_secs: f64,

    /// Number of utterances handed to the flush pipeline
    pub utterances_flushed: usize,

    /// Number of utterances dropped by normalize/transcribe failures
    pub utterances_dropped: usize,

    /// Last session-fatal error, if any
    pub last_error: Option<String>,
}

/// Everything a detached flush task needs; cheap to clone per utterance.
#[derive(Clone)]
struct FlushContext {
    session_id: String,
    normalizer: AudioNormalizer,
    transcriber: Arc<dyn Transcriber>,
    filter: TranscriptFilter,
    sink: Arc<dyn TranscriptSink>,
    request: TranscribeRequest,
}

/// Shared between the recorder handle and its capture task.
struct Shared {
    is_capturing: AtomicBool,
    utterances_flushed: AtomicUsize,
    utterances_dropped: AtomicUsize,
    started_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<CaptureError>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            is_capturing: AtomicBool::new(false),
            utterances_flushed: AtomicUsize::new(0),
            utterances_dropped: AtomicUsize::new(0),
            started_at: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }
}

/// Silence-gated capture orchestrator.
pub struct UtteranceRecorder {
    provider: Arc<dyn CaptureProvider>,
    config: RecorderConfig,
    flush_ctx: FlushContext,
    shared: Arc<Shared>,
    capture_task: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl UtteranceRecorder {
    pub fn new(
        provider: Arc<dyn CaptureProvider>,
        normalizer: AudioNormalizer,
        transcriber: Arc<dyn Transcriber>,
        filter: TranscriptFilter,
        sink: Arc<dyn TranscriptSink>,
        config: RecorderConfig,
    ) -> Self {
        let flush_ctx = FlushContext {
            session_id: config.session_id.clone(),
            normalizer,
            transcriber,
            filter,
            sink,
            request: config.request.clone(),
        };

        Self {
            provider,
            config,
            flush_ctx,
            shared: Arc::new(Shared::new()),
            capture_task: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn is_capturing(&self) -> bool {
        self.shared.is_capturing.load(Ordering::SeqCst)
    }

    /// Open the capture stream and begin silence-gated recording.
    ///
    /// Fails with `CaptureError::Unavailable` when the provider rejects the
    /// request and `CaptureError::NoAudioTrack` when the granted stream has
    /// no audio; both leave the recorder idle with all resources released.
    pub async fn start(&self) -> Result<(), CaptureError> {
        if self.shared.is_capturing.swap(true, Ordering::SeqCst) {
            warn!("Capture already started: {}", self.config.session_id);
            return Ok(());
        }

        info!("Starting capture session: {}", self.config.session_id);

        let result = self.acquire_and_spawn().await;
        if let Err(e) = &result {
            error!("Failed to start capture: {}", e);
            *self.shared.last_error.lock().await = Some(e.clone());
            self.shared.is_capturing.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn acquire_and_spawn(&self) -> Result<(), CaptureError> {
        let mut stream = self.provider.request_stream(&self.config.constraints).await?;

        if stream.audio_track_count() == 0 {
            stream.close().await;
            return Err(CaptureError::NoAudioTrack);
        }

        let probe = match stream.spectrum_probe() {
            Ok(probe) => probe,
            Err(e) => {
                stream.close().await;
                return Err(e);
            }
        };

        let chunk_rx = match stream.start_recording().await {
            Ok(rx) => rx,
            Err(e) => {
                stream.close().await;
                return Err(e);
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::channel(16);

        let detector_task = spawn_detector(
            probe,
            self.config.silence.clone(),
            event_tx,
            shutdown_rx.clone(),
        );

        let capture_task = tokio::spawn(run_capture(
            stream,
            chunk_rx,
            event_rx,
            detector_task,
            shutdown_rx,
            self.flush_ctx.clone(),
            Arc::clone(&self.shared),
        ));

        *self.capture_task.lock().await = Some(capture_task);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);
        *self.shared.started_at.lock().await = Some(Utc::now());

        info!("Capture session started: {}", self.config.session_id);

        Ok(())
    }

    /// Stop capturing and release all stream resources.
    ///
    /// Idempotent; safe to call while already idle. In-flight flushes are
    /// left to complete on their own — only future capture is cancelled.
    pub async fn stop(&self) -> CaptureStats {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(true);
        }

        if let Some(task) = self.capture_task.lock().await.take() {
            if let Err(e) = task.await {
                error!("Capture task panicked: {}", e);
            }
            info!("Capture session stopped: {}", self.config.session_id);
        } else {
            debug!("Stop on idle capture session: {}", self.config.session_id);
        }

        self.shared.is_capturing.store(false, Ordering::SeqCst);
        self.stats().await
    }

    /// Current session statistics.
    pub async fn stats(&self) -> CaptureStats {
        let started_at = *self.shared.started_at.lock().await;
        let duration_secs = started_at
            .map(|t| Utc::now().signed_duration_since(t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        let last_error = self
            .shared
            .last_error
            .lock()
            .await
            .as_ref()
            .map(|e| e.to_string());

        CaptureStats {
            is_capturing: self.shared.is_capturing.load(Ordering::SeqCst),
            started_at,
            duration_secs,
            utterances_flushed: self.shared.utterances_flushed.load(Ordering::SeqCst),
            utterances_dropped: self.shared.utterances_dropped.load(Ordering::SeqCst),
            last_error,
        }
    }
}

/// Receive from the active sub-session, if there is one.
async fn recv_chunk(rx: &mut Option<mpsc::Receiver<AudioChunk>>) -> Option<AudioChunk> {
    match rx {
        Some(rx) => rx.recv().await,
        None => None,
    }
}

/// Pull any chunks already queued for a stopped sub-session.
fn drain_pending(rx: &mut mpsc::Receiver<AudioChunk>, buffered: &mut Vec<AudioChunk>) {
    while let Ok(chunk) = rx.try_recv() {
        buffered.push(chunk);
    }
}

/// The capture state machine task. Sole owner/mutator of the stream.
async fn run_capture(
    mut stream: Box<dyn CaptureStream>,
    chunk_rx: mpsc::Receiver<AudioChunk>,
    mut events: mpsc::Receiver<DetectorEvent>,
    detector_task: JoinHandle<()>,
    mut shutdown: watch::Receiver<bool>,
    ctx: FlushContext,
    shared: Arc<Shared>,
) {
    let mime_type = stream.mime_type().to_string();
    let mut buffered: Vec<AudioChunk> = Vec::new();
    let mut sub_session = Some(chunk_rx);

    loop {
        tokio::select! {
            maybe_chunk = recv_chunk(&mut sub_session), if sub_session.is_some() => {
                match maybe_chunk {
                    Some(chunk) => buffered.push(chunk),
                    // Provider ended the sub-session; chunks arriving before
                    // the next one starts have nowhere to go and are dropped.
                    None => sub_session = None,
                }
            }

            event = events.recv() => match event {
                Some(DetectorEvent::Edge(SilenceEdge::Silence)) => {
                    if let Err(e) = stream.stop_recording().await {
                        warn!("Failed to stop sub-session: {}", e);
                    }
                    if let Some(rx) = sub_session.as_mut() {
                        drain_pending(rx, &mut buffered);
                    }
                    sub_session = None;

                    spawn_flush(&mime_type, std::mem::take(&mut buffered), &ctx, &shared);

                    // Re-arm immediately; the flush runs concurrently.
                    match stream.start_recording().await {
                        Ok(rx) => sub_session = Some(rx),
                        Err(e) => {
                            // The next speech-resumed edge retries.
                            warn!("Failed to re-arm sub-session: {}", e);
                        }
                    }
                }

                Some(DetectorEvent::Edge(SilenceEdge::SpeechResumed)) => {
                    if sub_session.is_none() {
                        match stream.start_recording().await {
                            Ok(rx) => sub_session = Some(rx),
                            Err(e) => warn!("Failed to restart sub-session: {}", e),
                        }
                    }
                }

                Some(DetectorEvent::StreamLost(e)) => {
                    error!("Capture stream lost: {}", e);
                    *shared.last_error.lock().await = Some(e);
                    break;
                }

                None => break,
            },

            _ = shutdown.changed() => break,
        }
    }

    // Teardown runs on every exit path: finalize the tail sub-session,
    // flush whatever it buffered, release the stream.
    if let Err(e) = stream.stop_recording().await {
        debug!("Stop recording during teardown: {}", e);
    }
    if let Some(rx) = sub_session.as_mut() {
        drain_pending(rx, &mut buffered);
    }
    if !buffered.is_empty() {
        spawn_flush(&mime_type, std::mem::take(&mut buffered), &ctx, &shared);
    }
    stream.close().await;
    detector_task.abort();
    shared.is_capturing.store(false, Ordering::SeqCst);

    debug!("Capture task finished: {}", ctx.session_id);
}

/// Hand one finished sub-session to the pipeline without blocking capture.
///
/// Failures are local to the utterance: logged, counted, never escalated.
fn spawn_flush(mime_type: &str, chunks: Vec<AudioChunk>, ctx: &FlushContext, shared: &Arc<Shared>) {
    if chunks.is_empty() {
        debug!("Skipping flush of empty sub-session");
        return;
    }

    let data: Vec<u8> = chunks.into_iter().flat_map(|c| c.data).collect();
    let blob = RecordedBlob::new(data, mime_type);
    let ctx = ctx.clone();
    let shared = Arc::clone(shared);

    shared.utterances_flushed.fetch_add(1, Ordering::SeqCst);

    tokio::spawn(async move {
        debug!(
            "Flushing utterance: {} bytes ({})",
            blob.data.len(),
            blob.mime_type
        );

        let normalizer = ctx.normalizer.clone();
        let wav = match tokio::task::spawn_blocking(move || normalizer.normalize(&blob)).await {
            Ok(Ok(wav)) => wav,
            Ok(Err(e)) => {
                warn!("Dropping utterance, normalization failed: {}", e);
                shared.utterances_dropped.fetch_add(1, Ordering::SeqCst);
                return;
            }
            Err(e) => {
                error!("Normalizer task panicked: {}", e);
                shared.utterances_dropped.fetch_add(1, Ordering::SeqCst);
                return;
            }
        };

        let text = match ctx.transcriber.transcribe(&wav, &ctx.request).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Dropping utterance, transcription failed: {}", e);
                shared.utterances_dropped.fetch_add(1, Ordering::SeqCst);
                return;
            }
        };

        if ctx.filter.should_suppress(&text) {
            debug!("Suppressed transcript: {:?}", text);
            return;
        }

        if let Err(e) = ctx.sink.deliver(&text).await {
            warn!("Transcript sink rejected delivery: {}", e);
        }
    });
}
