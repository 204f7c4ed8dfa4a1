// Captured-blob decoding
//
// A finished recording sub-session hands the pipeline one blob tagged with
// the capture stream's native mime type. Two decode paths:
//
// - "audio/pcm;rate=..;channels=.." — raw little-endian 16-bit PCM, the
//   native format of the bundled capture backends. Parsed directly.
// - anything else — probed and decoded by symphonia (WAV, FLAC, OGG, MP3,
//   M4A, ...).

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::NormalizeError;

/// Raw-PCM mime type emitted by the bundled capture backends.
pub const PCM_MIME_PREFIX: &str = "audio/pcm";

/// One recording sub-session's buffered chunks, concatenated.
#[derive(Debug, Clone)]
pub struct RecordedBlob {
    pub data: Vec<u8>,
    /// Native mime type of the recording facility that produced the data.
    pub mime_type: String,
}

impl RecordedBlob {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    /// Mime string for raw PCM at the given rate/channel layout.
    pub fn pcm_mime(sample_rate: u32, channels: u16) -> String {
        format!("{};rate={};channels={}", PCM_MIME_PREFIX, sample_rate, channels)
    }
}

/// Decoded PCM, interleaved f32 in -1.0..1.0.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Decode a captured blob to interleaved f32 PCM.
pub fn decode_blob(blob: &RecordedBlob) -> Result<DecodedAudio, NormalizeError> {
    if blob.data.is_empty() {
        return Err(NormalizeError::Decode("empty audio blob".to_string()));
    }

    if blob.mime_type.starts_with(PCM_MIME_PREFIX) {
        decode_raw_pcm(&blob.data, &blob.mime_type)
    } else {
        decode_container(blob)
    }
}

fn decode_raw_pcm(data: &[u8], mime_type: &str) -> Result<DecodedAudio, NormalizeError> {
    let sample_rate = mime_param(mime_type, "rate")
        .ok_or_else(|| NormalizeError::Decode(format!("missing rate parameter in {}", mime_type)))?;
    let channels = mime_param(mime_type, "channels").unwrap_or(1) as u16;

    if sample_rate == 0 {
        return Err(NormalizeError::Decode("zero sample rate in pcm mime".to_string()));
    }
    if channels == 0 {
        return Err(NormalizeError::Decode("zero channels in pcm mime".to_string()));
    }
    if data.len() % 2 != 0 {
        return Err(NormalizeError::Decode(format!(
            "raw pcm blob has odd length {}",
            data.len()
        )));
    }

    let samples: Vec<f32> = data
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect();

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

fn mime_param(mime_type: &str, key: &str) -> Option<u32> {
    mime_type.split(';').skip(1).find_map(|part| {
        let (k, v) = part.trim().split_once('=')?;
        if k.trim() == key {
            v.trim().parse().ok()
        } else {
            None
        }
    })
}

fn decode_container(blob: &RecordedBlob) -> Result<DecodedAudio, NormalizeError> {
    let cursor = Cursor::new(blob.data.clone());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_for_mime(&blob.mime_type) {
        hint.with_extension(ext);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|e| NormalizeError::Decode(format!("unrecognized audio container: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| NormalizeError::Decode("no decodable audio track".to_string()))?;
    let track_id = track.id;

    let dec_opts: DecoderOptions = Default::default();
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &dec_opts)
        .map_err(|e| NormalizeError::Decode(format!("unsupported codec: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut sample_rate = 0u32;
    let mut channels = 0u16;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // End of stream; truncated inputs end the same way.
            Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(NormalizeError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt packet is skippable; the rest of the stream may
            // still decode.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(NormalizeError::Decode(e.to_string())),
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            sample_rate = spec.rate;
            channels = spec.channels.count() as u16;
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }

        if let Some(buf) = &mut sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    if samples.is_empty() {
        return Err(NormalizeError::Decode("no audio samples decoded".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let subtype = mime_type
        .split(';')
        .next()?
        .trim()
        .strip_prefix("audio/")
        .or_else(|| mime_type.split(';').next()?.trim().strip_prefix("video/"))?;

    match subtype {
        "wav" | "wave" | "x-wav" => Some("wav"),
        "webm" => Some("webm"),
        "ogg" => Some("ogg"),
        "mpeg" | "mp3" => Some("mp3"),
        "mp4" | "m4a" => Some("m4a"),
        "flac" => Some("flac"),
        _ => None,
    }
}
