pub mod decode;
pub mod normalize;
pub mod spectrum;

pub use decode::{decode_blob, DecodedAudio, RecordedBlob};
pub use normalize::{AudioNormalizer, BandPassConfig, NormalizerConfig, WavBlob, TARGET_SAMPLE_RATE};
pub use spectrum::{SpectrumAnalyzer, SpectrumFrame};
