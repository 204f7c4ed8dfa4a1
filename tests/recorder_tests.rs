// Integration tests for the utterance recorder
//
// A scripted capture provider and transcriber drive the recorder through
// silence edges, per-utterance failures, and teardown paths without any
// real audio device or network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use voicegate::{
    AudioChunk, AudioNormalizer, CaptureError, CaptureProvider, CaptureStream, FilterConfig,
    MemorySink, NormalizerConfig, RecorderConfig, RecordedBlob, SilenceConfig, SpectrumFrame,
    SpectrumProbe, StreamConstraints, TranscribeRequest, Transcriber, TranscriptFilter,
    TranscriptSink, TranscriptionError, UtteranceRecorder, WavBlob,
};

// ============================================================================
// Scripted capture provider
// ============================================================================

/// Shared knobs the tests twist while the recorder runs.
#[derive(Clone)]
struct Control {
    energy: Arc<Mutex<f32>>,
    chunk_tx: Arc<Mutex<Option<mpsc::Sender<AudioChunk>>>>,
    sub_sessions_started: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
    stream_lost: Arc<AtomicBool>,
}

impl Control {
    fn new(initial_energy: f32) -> Self {
        Self {
            energy: Arc::new(Mutex::new(initial_energy)),
            chunk_tx: Arc::new(Mutex::new(None)),
            sub_sessions_started: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
            stream_lost: Arc::new(AtomicBool::new(false)),
        }
    }

    fn set_energy(&self, energy: f32) {
        *self.energy.lock().unwrap() = energy;
    }

    fn lose_stream(&self) {
        self.stream_lost.store(true, Ordering::SeqCst);
    }

    /// Send a chunk into whatever sub-session is currently active.
    async fn push_chunk(&self, data: Vec<u8>) {
        let tx = self.chunk_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx
                .send(AudioChunk {
                    data,
                    timestamp_ms: 0,
                })
                .await;
        }
    }

    fn sub_sessions(&self) -> usize {
        self.sub_sessions_started.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeProvider {
    control: Control,
    audio_tracks: usize,
    reject: bool,
    requests: Arc<AtomicUsize>,
}

impl FakeProvider {
    fn new(control: Control) -> Self {
        Self {
            control,
            audio_tracks: 1,
            reject: false,
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait::async_trait]
impl CaptureProvider for FakeProvider {
    async fn request_stream(
        &self,
        _constraints: &StreamConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        if self.reject {
            return Err(CaptureError::Unavailable("permission denied".to_string()));
        }
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            control: self.control.clone(),
            audio_tracks: self.audio_tracks,
            mime_type: RecordedBlob::pcm_mime(16000, 1),
        }))
    }
}

struct FakeStream {
    control: Control,
    audio_tracks: usize,
    mime_type: String,
}

#[async_trait::async_trait]
impl CaptureStream for FakeStream {
    fn audio_track_count(&self) -> usize {
        self.audio_tracks
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn spectrum_probe(&mut self) -> Result<Box<dyn SpectrumProbe>, CaptureError> {
        Ok(Box::new(FakeProbe {
            control: self.control.clone(),
        }))
    }

    async fn start_recording(&mut self) -> Result<mpsc::Receiver<AudioChunk>, CaptureError> {
        let (tx, rx) = mpsc::channel(64);
        *self.control.chunk_tx.lock().unwrap() = Some(tx);
        self.control.sub_sessions_started.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop_recording(&mut self) -> Result<(), CaptureError> {
        *self.control.chunk_tx.lock().unwrap() = None;
        Ok(())
    }

    async fn close(&mut self) {
        *self.control.chunk_tx.lock().unwrap() = None;
        self.control.closed.store(true, Ordering::SeqCst);
    }
}

struct FakeProbe {
    control: Control,
}

impl SpectrumProbe for FakeProbe {
    fn sample(&mut self) -> Result<SpectrumFrame, CaptureError> {
        if self.control.stream_lost.load(Ordering::SeqCst) {
            return Err(CaptureError::StreamLost("track ended".to_string()));
        }
        let level = *self.control.energy.lock().unwrap();
        Ok(SpectrumFrame {
            magnitudes: vec![level; 8],
            bin_hz: 250.0,
        })
    }
}

// ============================================================================
// Scripted transcriber
// ============================================================================

struct FakeTranscriber {
    responses: Mutex<VecDeque<Result<String, TranscriptionError>>>,
    fallback: String,
    calls: Arc<AtomicUsize>,
}

impl FakeTranscriber {
    fn new(fallback: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_responses(
        fallback: &str,
        responses: Vec<Result<String, TranscriptionError>>,
    ) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: fallback.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait::async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(
        &self,
        _audio: &WavBlob,
        _request: &TranscribeRequest,
    ) -> Result<String, TranscriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(self.fallback.clone()),
        }
    }
}

// ============================================================================
// Test helpers
// ============================================================================

/// Fast detector settings so tests settle in milliseconds.
fn test_silence_config() -> SilenceConfig {
    SilenceConfig {
        threshold_energy: 10.0,
        silence_duration_ms: 40,
        poll_interval_ms: 5,
        min_silent_frames: 2,
        band: None,
    }
}

fn make_recorder(
    provider: Arc<dyn CaptureProvider>,
    transcriber: Arc<dyn Transcriber>,
    sink: Arc<dyn TranscriptSink>,
) -> UtteranceRecorder {
    UtteranceRecorder::new(
        provider,
        AudioNormalizer::new(NormalizerConfig {
            target_sample_rate: 16000,
            band_pass: None,
            gain: 1.0,
        }),
        transcriber,
        TranscriptFilter::new(FilterConfig {
            filler_phrases: Vec::new(),
            ..FilterConfig::default()
        }),
        sink,
        RecorderConfig {
            session_id: "test-session".to_string(),
            constraints: StreamConstraints::default(),
            silence: test_silence_config(),
            request: TranscribeRequest::default(),
        },
    )
}

/// Valid little-endian 16-bit PCM payload (even length).
fn pcm_chunk(samples: usize) -> Vec<u8> {
    (0..samples)
        .flat_map(|i| ((i % 100) as i16 * 50).to_le_bytes())
        .collect()
}

/// Poll a condition until it holds or the deadline passes.
async fn wait_until<F>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send>>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

macro_rules! wait_for {
    ($cond:expr, $timeout_ms:expr, $msg:expr) => {
        assert!(
            wait_until(|| Box::pin($cond), $timeout_ms).await,
            $msg
        )
    };
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_silence_edge_delivers_and_rearms() {
    let control = Control::new(50.0);
    let provider = Arc::new(FakeProvider::new(control.clone()));
    let transcriber = Arc::new(FakeTranscriber::new("hello world"));
    let sink = MemorySink::new();

    let recorder = make_recorder(
        provider,
        transcriber.clone(),
        Arc::new(sink.clone()),
    );

    recorder.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    control.push_chunk(pcm_chunk(1600)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Sustained quiet confirms silence and flushes the utterance.
    control.set_energy(2.0);
    let sink_probe = sink.clone();
    wait_for!(
        {
            let sink = sink_probe.clone();
            async move { sink.len().await == 1 }
        },
        2000,
        "utterance was never delivered"
    );

    let segments = sink.segments().await;
    assert_eq!(segments[0].text, "hello world");

    // Capture re-armed immediately: a second sub-session exists and the
    // recorder is still capturing.
    assert!(control.sub_sessions() >= 2, "capture did not re-arm");
    assert!(recorder.is_capturing());

    recorder.stop().await;
    assert!(control.is_closed());
}

#[tokio::test]
async fn test_stop_flushes_tail_utterance() {
    let control = Control::new(50.0);
    let provider = Arc::new(FakeProvider::new(control.clone()));
    let transcriber = Arc::new(FakeTranscriber::new("tail"));
    let sink = MemorySink::new();

    let recorder = make_recorder(provider, transcriber, Arc::new(sink.clone()));

    recorder.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    control.push_chunk(pcm_chunk(1600)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // No silence edge ever fires; stop() finalizes the open sub-session.
    let stats = recorder.stop().await;
    assert!(!stats.is_capturing);

    let sink_probe = sink.clone();
    wait_for!(
        {
            let sink = sink_probe.clone();
            async move { sink.len().await == 1 }
        },
        2000,
        "tail utterance was not flushed on stop"
    );
    assert!(control.is_closed());
}

#[tokio::test]
async fn test_decode_error_is_isolated_to_one_utterance() {
    let control = Control::new(50.0);
    let provider = Arc::new(FakeProvider::new(control.clone()));
    let transcriber = Arc::new(FakeTranscriber::new("ok"));
    let sink = MemorySink::new();

    let recorder = make_recorder(provider, transcriber, Arc::new(sink.clone()));
    recorder.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Utterance 1: odd-length payload cannot decode as 16-bit PCM.
    control.push_chunk(vec![0u8; 3]).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    control.set_energy(2.0);

    let recorder = Arc::new(recorder);
    let stats_probe = Arc::clone(&recorder);
    wait_for!(
        {
            let recorder = Arc::clone(&stats_probe);
            async move { recorder.stats().await.utterances_dropped == 1 }
        },
        2000,
        "decode failure was not counted"
    );

    // Utterance 2 proceeds untouched.
    control.set_energy(50.0);
    tokio::time::sleep(Duration::from_millis(30)).await;
    control.push_chunk(pcm_chunk(1600)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    control.set_energy(2.0);

    let sink_probe = sink.clone();
    wait_for!(
        {
            let sink = sink_probe.clone();
            async move { sink.len().await == 1 }
        },
        2000,
        "next utterance was not delivered"
    );

    let segments = sink.segments().await;
    assert_eq!(segments[0].text, "ok");

    let stats = recorder.stats().await;
    assert_eq!(stats.utterances_flushed, 2);
    assert_eq!(stats.utterances_dropped, 1);
    assert!(stats.is_capturing, "capture must continue past a bad utterance");

    recorder.stop().await;
}

#[tokio::test]
async fn test_transcription_error_never_reaches_sink() {
    let control = Control::new(50.0);
    let provider = Arc::new(FakeProvider::new(control.clone()));
    let transcriber = Arc::new(FakeTranscriber::with_responses(
        "second",
        vec![Err(TranscriptionError::Network(
            "connection refused".to_string(),
        ))],
    ));
    let sink = MemorySink::new();

    let recorder = make_recorder(provider, transcriber, Arc::new(sink.clone()));
    recorder.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Utterance 1 hits the network error: logged, dropped, no delivery.
    control.push_chunk(pcm_chunk(1600)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    control.set_energy(2.0);

    let recorder = Arc::new(recorder);
    let stats_probe = Arc::clone(&recorder);
    wait_for!(
        {
            let recorder = Arc::clone(&stats_probe);
            async move { recorder.stats().await.utterances_dropped == 1 }
        },
        2000,
        "transcription failure was not counted"
    );
    assert!(sink.is_empty().await);

    // Utterance 2 is processed normally.
    control.set_energy(50.0);
    tokio::time::sleep(Duration::from_millis(30)).await;
    control.push_chunk(pcm_chunk(1600)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    control.set_energy(2.0);

    let sink_probe = sink.clone();
    wait_for!(
        {
            let sink = sink_probe.clone();
            async move { sink.len().await == 1 }
        },
        2000,
        "second utterance was not delivered"
    );
    assert_eq!(sink.segments().await[0].text, "second");

    recorder.stop().await;
}

#[tokio::test]
async fn test_empty_transcript_is_suppressed() {
    let control = Control::new(50.0);
    let provider = Arc::new(FakeProvider::new(control.clone()));
    let transcriber = Arc::new(FakeTranscriber::new("  "));
    let sink = MemorySink::new();

    let recorder = make_recorder(provider, transcriber.clone(), Arc::new(sink.clone()));
    recorder.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    control.push_chunk(pcm_chunk(1600)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    control.set_energy(2.0);

    let calls = Arc::clone(&transcriber.calls);
    wait_for!(
        {
            let calls = Arc::clone(&calls);
            async move { calls.load(Ordering::SeqCst) == 1 }
        },
        2000,
        "utterance was never transcribed"
    );

    // Suppression is not an error: nothing delivered, nothing dropped.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sink.is_empty().await);
    let stats = recorder.stop().await;
    assert_eq!(stats.utterances_dropped, 0);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let control = Control::new(50.0);
    let provider = Arc::new(FakeProvider::new(control.clone()));
    let transcriber = Arc::new(FakeTranscriber::new("x"));
    let sink = MemorySink::new();

    let recorder = make_recorder(provider, transcriber, Arc::new(sink));

    // Stop while idle is a no-op.
    let stats = recorder.stop().await;
    assert!(!stats.is_capturing);

    recorder.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let first = recorder.stop().await;
    assert!(!first.is_capturing);
    assert!(control.is_closed(), "stream must be released on stop");

    // Second stop changes nothing and does not error.
    let second = recorder.stop().await;
    assert!(!second.is_capturing);
}

#[tokio::test]
async fn test_start_twice_keeps_one_stream() {
    let control = Control::new(50.0);
    let provider = Arc::new(FakeProvider::new(control.clone()));
    let requests = Arc::clone(&provider.requests);
    let transcriber = Arc::new(FakeTranscriber::new("x"));

    let recorder = make_recorder(provider, transcriber, Arc::new(MemorySink::new()));

    recorder.start().await.unwrap();
    recorder.start().await.unwrap();
    assert_eq!(requests.load(Ordering::SeqCst), 1);

    recorder.stop().await;
}

#[tokio::test]
async fn test_no_audio_track_fails_start() {
    let control = Control::new(50.0);
    let mut provider = FakeProvider::new(control.clone());
    provider.audio_tracks = 0;
    let transcriber = Arc::new(FakeTranscriber::new("x"));

    let recorder = make_recorder(Arc::new(provider), transcriber, Arc::new(MemorySink::new()));

    let err = recorder.start().await.unwrap_err();
    assert!(matches!(err, CaptureError::NoAudioTrack));
    assert!(!recorder.is_capturing());
    assert!(control.is_closed(), "granted stream must be released");
}

#[tokio::test]
async fn test_provider_rejection_fails_start() {
    let control = Control::new(50.0);
    let mut provider = FakeProvider::new(control);
    provider.reject = true;
    let transcriber = Arc::new(FakeTranscriber::new("x"));

    let recorder = make_recorder(Arc::new(provider), transcriber, Arc::new(MemorySink::new()));

    let err = recorder.start().await.unwrap_err();
    assert!(matches!(err, CaptureError::Unavailable(_)));
    assert!(!recorder.is_capturing());
}

#[tokio::test]
async fn test_stream_loss_tears_down_capture() {
    let control = Control::new(50.0);
    let provider = Arc::new(FakeProvider::new(control.clone()));
    let transcriber = Arc::new(FakeTranscriber::new("x"));

    let recorder = Arc::new(make_recorder(
        provider,
        transcriber,
        Arc::new(MemorySink::new()),
    ));
    recorder.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    control.lose_stream();

    let probe = Arc::clone(&recorder);
    wait_for!(
        {
            let recorder = Arc::clone(&probe);
            async move { !recorder.is_capturing() }
        },
        2000,
        "stream loss did not stop capture"
    );

    assert!(control.is_closed(), "stream loss must release resources");
    let stats = recorder.stats().await;
    assert!(stats.last_error.unwrap().contains("lost"));
}
