pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod http;
pub mod sink;
pub mod transcribe;

pub use audio::{
    AudioNormalizer, BandPassConfig, NormalizerConfig, RecordedBlob, SpectrumAnalyzer,
    SpectrumFrame, WavBlob,
};
pub use capture::{
    AudioChunk, CaptureProvider, CaptureStats, CaptureStream, FileCaptureProvider,
    FileProviderOptions, RecorderConfig, SilenceConfig, SilenceDetector, SilenceEdge,
    SpectrumProbe, StreamConstraints, UtteranceRecorder, VideoConstraints,
};
pub use config::Config;
pub use error::{CaptureError, NormalizeError, TranscriptionError};
pub use http::{create_router, AppState};
pub use sink::{
    FanoutSink, MemorySink, NatsSink, TranscriptMessage, TranscriptSegment, TranscriptSink,
};
pub use transcribe::{
    FilterConfig, HttpTranscriber, HttpTranscriberConfig, TranscribeRequest, Transcriber,
    TranscriptFilter,
};
