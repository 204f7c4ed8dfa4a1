use anyhow::Result;
use serde::Deserialize;
use tracing::warn;

use crate::audio::{BandPassConfig, NormalizerConfig, TARGET_SAMPLE_RATE};
use crate::capture::{SilenceConfig, StreamConstraints, VideoConstraints};
use crate::transcribe::{FilterConfig, HttpTranscriberConfig, TranscribeRequest};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub silence: SilenceSettings,
    #[serde(default)]
    pub normalize: NormalizeSettings,
    #[serde(default)]
    pub transcription: TranscriptionSettings,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub nats: NatsSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "ServiceConfig::default_name")]
    pub name: String,
    #[serde(default)]
    pub http: HttpConfig,
}

impl ServiceConfig {
    fn default_name() -> String {
        "voicegate".to_string()
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "HttpConfig::default_bind")]
    pub bind: String,
    #[serde(default = "HttpConfig::default_port")]
    pub port: u16,
}

impl HttpConfig {
    fn default_bind() -> String {
        "127.0.0.1".to_string()
    }

    fn default_port() -> u16 {
        8900
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
            port: Self::default_port(),
        }
    }
}

/// Stream constraints requested from the capture provider.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureSettings {
    #[serde(default = "CaptureSettings::default_video_width")]
    pub video_width: u32,
    #[serde(default = "CaptureSettings::default_video_height")]
    pub video_height: u32,
    #[serde(default = "CaptureSettings::default_video_frame_rate")]
    pub video_frame_rate: u32,
}

impl CaptureSettings {
    fn default_video_width() -> u32 {
        40
    }

    fn default_video_height() -> u32 {
        60
    }

    fn default_video_frame_rate() -> u32 {
        15
    }

    pub fn constraints(&self) -> StreamConstraints {
        StreamConstraints {
            audio: true,
            video: Some(VideoConstraints {
                width: self.video_width,
                height: self.video_height,
                frame_rate: self.video_frame_rate,
            }),
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            video_width: Self::default_video_width(),
            video_height: Self::default_video_height(),
            video_frame_rate: Self::default_video_frame_rate(),
        }
    }
}

/// Silence classification tuning.
///
/// Threshold and confirmation duration default per platform: desktop
/// capture gain on macOS runs hotter than elsewhere, so the threshold and
/// debounce window are both larger there. The detector itself is
/// platform-agnostic and only ever sees the resolved numbers.
#[derive(Debug, Clone, Deserialize)]
pub struct SilenceSettings {
    #[serde(default = "SilenceSettings::platform_threshold")]
    pub threshold_energy: f32,
    #[serde(default = "SilenceSettings::platform_duration_ms")]
    pub silence_duration_ms: u64,
    #[serde(default = "SilenceSettings::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "SilenceSettings::default_min_silent_frames")]
    pub min_silent_frames: u32,
    #[serde(default = "SilenceSettings::default_band_low_hz")]
    pub band_low_hz: f32,
    #[serde(default = "SilenceSettings::default_band_high_hz")]
    pub band_high_hz: f32,
    /// Disable the speech sub-band restriction (broadband energy).
    #[serde(default)]
    pub broadband: bool,
}

impl SilenceSettings {
    fn platform_threshold() -> f32 {
        if cfg!(target_os = "macos") {
            15.0
        } else {
            10.0
        }
    }

    fn platform_duration_ms() -> u64 {
        if cfg!(target_os = "macos") {
            2500
        } else {
            1500
        }
    }

    fn default_poll_interval_ms() -> u64 {
        100
    }

    fn default_min_silent_frames() -> u32 {
        3
    }

    fn default_band_low_hz() -> f32 {
        300.0
    }

    fn default_band_high_hz() -> f32 {
        3400.0
    }

    pub fn resolve(&self) -> SilenceConfig {
        SilenceConfig {
            threshold_energy: self.threshold_energy,
            silence_duration_ms: self.silence_duration_ms,
            poll_interval_ms: self.poll_interval_ms,
            min_silent_frames: self.min_silent_frames,
            band: if self.broadband {
                None
            } else {
                Some((self.band_low_hz, self.band_high_hz))
            },
        }
    }
}

impl Default for SilenceSettings {
    fn default() -> Self {
        Self {
            threshold_energy: Self::platform_threshold(),
            silence_duration_ms: Self::platform_duration_ms(),
            poll_interval_ms: Self::default_poll_interval_ms(),
            min_silent_frames: Self::default_min_silent_frames(),
            band_low_hz: Self::default_band_low_hz(),
            band_high_hz: Self::default_band_high_hz(),
            broadband: false,
        }
    }
}

/// Canonical-audio rendering settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NormalizeSettings {
    #[serde(default = "NormalizeSettings::default_target_sample_rate")]
    pub target_sample_rate: u32,
    /// Disable the speech band-pass stage.
    #[serde(default)]
    pub skip_band_pass: bool,
    #[serde(default = "NormalizeSettings::default_band_pass_center_hz")]
    pub band_pass_center_hz: f32,
    #[serde(default = "NormalizeSettings::default_band_pass_q")]
    pub band_pass_q: f32,
    #[serde(default = "NormalizeSettings::default_gain")]
    pub gain: f32,
}

impl NormalizeSettings {
    fn default_target_sample_rate() -> u32 {
        TARGET_SAMPLE_RATE
    }

    fn default_band_pass_center_hz() -> f32 {
        1000.0
    }

    fn default_band_pass_q() -> f32 {
        1.0
    }

    fn default_gain() -> f32 {
        1.5
    }

    pub fn resolve(&self) -> NormalizerConfig {
        NormalizerConfig {
            target_sample_rate: self.target_sample_rate,
            band_pass: if self.skip_band_pass {
                None
            } else {
                Some(BandPassConfig {
                    center_hz: self.band_pass_center_hz,
                    q: self.band_pass_q,
                })
            },
            gain: self.gain,
        }
    }
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            target_sample_rate: Self::default_target_sample_rate(),
            skip_band_pass: false,
            band_pass_center_hz: Self::default_band_pass_center_hz(),
            band_pass_q: Self::default_band_pass_q(),
            gain: Self::default_gain(),
        }
    }
}

/// Speech-to-text provider settings. The API key itself stays out of the
/// config file; only the environment variable name is configured.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionSettings {
    #[serde(default = "TranscriptionSettings::default_endpoint")]
    pub endpoint: String,
    #[serde(default = "TranscriptionSettings::default_model")]
    pub model: String,
    #[serde(default = "TranscriptionSettings::default_language")]
    pub language: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "TranscriptionSettings::default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "TranscriptionSettings::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl TranscriptionSettings {
    fn default_endpoint() -> String {
        HttpTranscriberConfig::default().endpoint
    }

    fn default_model() -> String {
        "whisper-large-v3-turbo".to_string()
    }

    fn default_language() -> String {
        "en".to_string()
    }

    fn default_api_key_env() -> String {
        "GROQ_API_KEY".to_string()
    }

    fn default_timeout_secs() -> u64 {
        60
    }

    pub fn request(&self) -> TranscribeRequest {
        TranscribeRequest {
            model: self.model.clone(),
            language: self.language.clone(),
            temperature: self.temperature,
        }
    }

    /// Resolve the API key from the configured environment variable.
    pub fn client_config(&self) -> HttpTranscriberConfig {
        HttpTranscriberConfig {
            endpoint: self.endpoint.clone(),
            api_key: std::env::var(&self.api_key_env).unwrap_or_default(),
            api_key_env: self.api_key_env.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            model: Self::default_model(),
            language: Self::default_language(),
            temperature: 0.0,
            api_key_env: Self::default_api_key_env(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

/// Optional NATS transcript transport.
#[derive(Debug, Clone, Deserialize)]
pub struct NatsSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "NatsSettings::default_url")]
    pub url: String,
}

impl NatsSettings {
    fn default_url() -> String {
        "nats://localhost:4222".to_string()
    }
}

impl Default for NatsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: Self::default_url(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load from file, falling back to defaults when the file is missing.
    pub fn load_or_default(path: &str) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Using default configuration ({}): {}", path, e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve() {
        let config = Config::default();
        let silence = config.silence.resolve();

        assert!(silence.threshold_energy > 0.0);
        assert!(silence.silence_duration_ms >= 1500);
        assert_eq!(silence.poll_interval_ms, 100);
        assert!(silence.band.is_some());

        let normalizer = config.normalize.resolve();
        assert_eq!(normalizer.target_sample_rate, 16000);
        assert!(normalizer.band_pass.is_some());
    }

    #[test]
    fn test_broadband_disables_band() {
        let settings = SilenceSettings {
            broadband: true,
            ..SilenceSettings::default()
        };
        assert!(settings.resolve().band.is_none());
    }

    #[test]
    fn test_transcription_request_carries_tuning() {
        let settings = TranscriptionSettings {
            model: "whisper-1".to_string(),
            language: "de".to_string(),
            temperature: 0.2,
            ..TranscriptionSettings::default()
        };

        let request = settings.request();
        assert_eq!(request.model, "whisper-1");
        assert_eq!(request.language, "de");
        assert!((request.temperature - 0.2).abs() < f32::EPSILON);
    }
}
