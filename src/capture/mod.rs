//! Silence-gated capture
//!
//! This module provides the capture side of the pipeline:
//! - Provider/stream traits for acquiring live audio
//! - Silence detection with hysteresis over spectrum snapshots
//! - The `UtteranceRecorder` that segments capture into utterances and
//!   hands each one to normalization/transcription/delivery
//! - A file-backed provider for testing and batch processing

pub mod file;
pub mod provider;
pub mod recorder;
pub mod silence;

pub use file::{FileCaptureProvider, FileProviderOptions};
pub use provider::{
    AudioChunk, CaptureProvider, CaptureStream, SpectrumProbe, StreamConstraints, VideoConstraints,
};
pub use recorder::{CaptureStats, RecorderConfig, UtteranceRecorder};
pub use silence::{DetectorEvent, SilenceConfig, SilenceDetector, SilenceEdge};
