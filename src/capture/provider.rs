use anyhow::Result;
use tokio::sync::mpsc;

use crate::audio::SpectrumFrame;
use crate::error::CaptureError;

/// Geometry constraints for any video track accompanying the audio capture.
///
/// These are configuration, not semantics: the pipeline only consumes the
/// audio track, and keeps the video request minimal.
#[derive(Debug, Clone)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: 40,
            height: 60,
            frame_rate: 15,
        }
    }
}

/// Constraints passed to a capture provider when requesting a stream.
#[derive(Debug, Clone)]
pub struct StreamConstraints {
    /// Request an audio track (the pipeline requires one).
    pub audio: bool,
    /// Optional accompanying video track.
    pub video: Option<VideoConstraints>,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: Some(VideoConstraints::default()),
        }
    }
}

/// One piece of recorded data emitted by an active recording sub-session.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub data: Vec<u8>,
    /// Milliseconds since the sub-session started.
    pub timestamp_ms: u64,
}

/// Frequency-domain view of a live stream's audio track.
///
/// Bound to one stream's analysis context; sampling fails with `StreamLost`
/// once the underlying track is gone.
pub trait SpectrumProbe: Send {
    fn sample(&mut self) -> Result<SpectrumFrame, CaptureError>;
}

/// Capture device/stream provider.
///
/// Implementations:
/// - `FileCaptureProvider`: streams a decoded audio file (testing/batch)
/// - platform screen-share or microphone providers supplied by the host
///   application
#[async_trait::async_trait]
pub trait CaptureProvider: Send + Sync {
    /// Open a live stream honoring the given constraints.
    ///
    /// Fails with `CaptureError::Unavailable` when the device cannot be
    /// opened (permission denied, no suitable source).
    async fn request_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// One open capture stream and its recording facility.
///
/// Recording sub-sessions never overlap: `start_recording` may only be
/// called when no sub-session is active, and `stop_recording` ends the
/// active one (dropping its chunk sender, which closes the receiver).
#[async_trait::async_trait]
pub trait CaptureStream: Send {
    /// Number of audio tracks the granted stream carries.
    fn audio_track_count(&self) -> usize;

    /// Native mime type of the chunks this stream's recorder produces.
    fn mime_type(&self) -> &str;

    /// Create the analysis context for silence detection.
    fn spectrum_probe(&mut self) -> Result<Box<dyn SpectrumProbe>, CaptureError>;

    /// Begin a recording sub-session; chunks arrive on the returned channel.
    async fn start_recording(&mut self) -> Result<mpsc::Receiver<AudioChunk>, CaptureError>;

    /// End the active recording sub-session.
    async fn stop_recording(&mut self) -> Result<(), CaptureError>;

    /// Stop all tracks and close the analysis context. Idempotent.
    async fn close(&mut self);
}
