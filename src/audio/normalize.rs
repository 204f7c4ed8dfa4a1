// Canonical-audio rendering
//
// Turns one recording sub-session's blob into the payload the transcription
// provider accepts: mono, 16 kHz, 16-bit WAV. Pipeline per call:
// decode -> downmix -> optional band-pass + gain -> resample -> WAV encode.
//
// The normalizer is stateless; concurrent utterances share nothing.

use std::io::Cursor;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

use super::decode::{decode_blob, DecodedAudio, RecordedBlob};
use crate::error::NormalizeError;

/// Sample rate the transcription provider expects.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Band-pass shaping applied before resampling, centered on speech content.
#[derive(Debug, Clone)]
pub struct BandPassConfig {
    pub center_hz: f32,
    pub q: f32,
}

impl Default for BandPassConfig {
    fn default() -> Self {
        Self {
            center_hz: 1000.0,
            q: 1.0,
        }
    }
}

/// Configuration for audio normalization.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Output sample rate (16 kHz for the transcription provider).
    pub target_sample_rate: u32,
    /// Optional speech band-pass; omitting it degrades quality on noisy
    /// captures but is not an error.
    pub band_pass: Option<BandPassConfig>,
    /// Fixed gain boost applied after filtering.
    pub gain: f32,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: TARGET_SAMPLE_RATE,
            band_pass: Some(BandPassConfig::default()),
            gain: 1.5,
        }
    }
}

/// WAV-encoded canonical audio, tagged `audio/wav`.
#[derive(Debug, Clone)]
pub struct WavBlob {
    pub data: Vec<u8>,
    pub sample_rate: u32,
    pub sample_count: usize,
}

impl WavBlob {
    pub const MIME_TYPE: &'static str = "audio/wav";

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count as f64 / self.sample_rate as f64
    }
}

/// Stateless converter from captured blobs to canonical WAV payloads.
#[derive(Debug, Clone)]
pub struct AudioNormalizer {
    config: NormalizerConfig,
}

impl AudioNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn normalize(&self, blob: &RecordedBlob) -> Result<WavBlob, NormalizeError> {
        let decoded = decode_blob(blob)?;
        let source_rate = decoded.sample_rate;

        let mut samples = downmix_to_mono(&decoded);

        if let Some(band_pass) = &self.config.band_pass {
            let mut filter = Biquad::band_pass(band_pass.center_hz, band_pass.q, source_rate);
            filter.process(&mut samples);
        }

        if (self.config.gain - 1.0).abs() > f32::EPSILON {
            for sample in &mut samples {
                *sample = (*sample * self.config.gain).clamp(-1.0, 1.0);
            }
        }

        let resampled = resample(&samples, source_rate, self.config.target_sample_rate)?;
        let wav = encode_wav(&resampled, self.config.target_sample_rate)?;

        debug!(
            "Normalized {} byte blob ({}): {:.2}s at {}Hz",
            blob.data.len(),
            blob.mime_type,
            wav.duration_seconds(),
            wav.sample_rate
        );

        Ok(wav)
    }
}

/// Collapse interleaved channels by summing with clipping (no division, to
/// preserve volume).
fn downmix_to_mono(decoded: &DecodedAudio) -> Vec<f32> {
    let channels = decoded.channels as usize;
    if channels <= 1 {
        return decoded.samples.clone();
    }

    decoded
        .samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>().clamp(-1.0, 1.0))
        .collect()
}

/// Direct-form-I biquad, band-pass with 0 dB peak gain.
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    fn band_pass(center_hz: f32, q: f32, sample_rate: u32) -> Self {
        let omega = 2.0 * std::f32::consts::PI * center_hz / sample_rate as f32;
        let alpha = omega.sin() / (2.0 * q.max(f32::EPSILON));
        let a0 = 1.0 + alpha;

        Self {
            b0: alpha / a0,
            b1: 0.0,
            b2: -alpha / a0,
            a1: -2.0 * omega.cos() / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            let x = *sample;
            let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
                - self.a1 * self.y1
                - self.a2 * self.y2;
            self.x2 = self.x1;
            self.x1 = x;
            self.y2 = self.y1;
            self.y1 = y;
            *sample = y;
        }
    }
}

fn resample(input: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>, NormalizeError> {
    if source_rate == 0 {
        return Err(NormalizeError::Render("source sample rate is zero".to_string()));
    }
    if source_rate == target_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let chunk_size = 1024usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
        .map_err(|e| NormalizeError::Render(format!("resampler init: {}", e)))?;

    let mut output = Vec::with_capacity((input.len() as f64 * ratio) as usize + chunk_size);

    for chunk in input.chunks(chunk_size) {
        let waves_in = if chunk.len() == chunk_size {
            vec![chunk.to_vec()]
        } else {
            // Pad the final partial chunk; the tail is trimmed below.
            let mut padded = chunk.to_vec();
            padded.resize(chunk_size, 0.0);
            vec![padded]
        };

        let waves_out = resampler
            .process(&waves_in, None)
            .map_err(|e| NormalizeError::Render(format!("resample: {}", e)))?;
        output.extend_from_slice(&waves_out[0]);
    }

    // Trim the padding introduced by the final chunk.
    let expected = (input.len() as f64 * ratio).round() as usize;
    output.truncate(expected);

    Ok(output)
}

fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<WavBlob, NormalizeError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| NormalizeError::Render(format!("wav writer: {}", e)))?;

        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(value)
                .map_err(|e| NormalizeError::Render(format!("wav sample: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| NormalizeError::Render(format!("wav finalize: {}", e)))?;
    }

    Ok(WavBlob {
        data: cursor.into_inner(),
        sample_rate,
        sample_count: samples.len(),
    })
}
