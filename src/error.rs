use thiserror::Error;

/// Errors that end a capture session (or prevent it from starting).
///
/// Per-utterance failures are *not* represented here: a bad blob or a failed
/// transcription drops that utterance and capture continues. Only stream
/// acquisition and stream loss escalate to a stopped session.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    /// The capture provider rejected the stream request (permission denied,
    /// no suitable device, device busy).
    #[error("capture unavailable: {0}")]
    Unavailable(String),

    /// The provider granted a stream, but it carries no audio track.
    #[error("captured stream has no audio track")]
    NoAudioTrack,

    /// The active audio track disappeared mid-capture (e.g. the user ended
    /// the screen share from the browser chrome).
    #[error("capture stream lost: {0}")]
    StreamLost(String),
}

/// Errors local to normalizing a single utterance's audio.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The recorded blob could not be decoded as audio (empty, truncated,
    /// or an unsupported container/codec).
    #[error("failed to decode captured audio: {0}")]
    Decode(String),

    /// Decoding succeeded but rendering the canonical WAV payload did not
    /// (resampler or encoder failure).
    #[error("failed to render normalized audio: {0}")]
    Render(String),
}

/// Errors from the speech-to-text provider, local to a single utterance.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// No API key was configured for the provider.
    #[error("transcription API key not configured (set {0})")]
    MissingApiKey(String),

    /// Transport-level failure: connection refused, timeout, TLS, etc.
    #[error("transcription request failed: {0}")]
    Network(String),

    /// The provider answered with a non-success status.
    #[error("transcription provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    /// The provider's response body could not be parsed.
    #[error("failed to parse transcription response: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_error_display() {
        let err = CaptureError::Unavailable("permission denied".to_string());
        assert!(err.to_string().contains("permission denied"));

        assert_eq!(
            CaptureError::NoAudioTrack.to_string(),
            "captured stream has no audio track"
        );
    }

    #[test]
    fn test_transcription_error_display() {
        let err = TranscriptionError::Provider {
            status: 401,
            message: "invalid api key".to_string(),
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("invalid api key"));
    }
}
