// File-backed capture provider (testing / batch processing)
//
// Streams a decoded audio file as if it were a live device: chunks are
// paced in real time (or accelerated), and the spectrum probe reflects the
// most recently emitted audio. Once the file is exhausted the probe reports
// silence, so the detector closes out the final utterance naturally.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::provider::{
    AudioChunk, CaptureProvider, CaptureStream, SpectrumProbe, StreamConstraints,
};
use crate::audio::{decode_blob, RecordedBlob, SpectrumAnalyzer, SpectrumFrame};
use crate::error::CaptureError;

#[derive(Debug, Clone)]
pub struct FileProviderOptions {
    /// Size of each emitted chunk in milliseconds of audio.
    pub chunk_ms: u64,
    /// Pace chunks at the file's natural rate; disable for batch runs.
    pub realtime: bool,
    /// FFT size of the spectrum probe.
    pub fft_size: usize,
}

impl Default for FileProviderOptions {
    fn default() -> Self {
        Self {
            chunk_ms: 100,
            realtime: true,
            fft_size: 512,
        }
    }
}

/// Capture provider that replays an audio file.
pub struct FileCaptureProvider {
    path: PathBuf,
    options: FileProviderOptions,
}

impl FileCaptureProvider {
    pub fn new(path: impl AsRef<Path>, options: FileProviderOptions) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            options,
        }
    }
}

#[async_trait::async_trait]
impl CaptureProvider for FileCaptureProvider {
    async fn request_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        if !constraints.audio {
            return Err(CaptureError::Unavailable(
                "file capture requires an audio track request".to_string(),
            ));
        }

        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|e| CaptureError::Unavailable(format!("{}: {}", self.path.display(), e)))?;

        let mime = mime_for_path(&self.path);
        let decoded = decode_blob(&RecordedBlob::new(data, mime))
            .map_err(|e| CaptureError::Unavailable(format!("{}: {}", self.path.display(), e)))?;

        // Fold interleaved channels down to mono for both the chunk feed
        // and the analysis window.
        let channels = decoded.channels.max(1) as usize;
        let mono_f32: Vec<f32> = decoded
            .samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        let mono_i16: Vec<i16> = mono_f32
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect();

        info!(
            "Opened file capture stream: {} ({:.1}s at {}Hz)",
            self.path.display(),
            mono_f32.len() as f64 / decoded.sample_rate as f64,
            decoded.sample_rate
        );

        Ok(Box::new(FileCaptureStream {
            mime_type: RecordedBlob::pcm_mime(decoded.sample_rate, 1),
            samples_i16: Arc::new(mono_i16),
            samples_f32: Arc::new(mono_f32),
            sample_rate: decoded.sample_rate,
            options: self.options.clone(),
            position: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
            pacer: None,
        }))
    }
}

struct FileCaptureStream {
    mime_type: String,
    samples_i16: Arc<Vec<i16>>,
    samples_f32: Arc<Vec<f32>>,
    sample_rate: u32,
    options: FileProviderOptions,
    /// Next sample to emit; shared with the pacing task so playback
    /// continues across sub-sessions.
    position: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
    pacer: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

#[async_trait::async_trait]
impl CaptureStream for FileCaptureStream {
    fn audio_track_count(&self) -> usize {
        1
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn spectrum_probe(&mut self) -> Result<Box<dyn SpectrumProbe>, CaptureError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CaptureError::StreamLost("stream closed".to_string()));
        }

        Ok(Box::new(FileSpectrumProbe {
            analyzer: SpectrumAnalyzer::new(self.options.fft_size, self.sample_rate),
            samples: Arc::clone(&self.samples_f32),
            position: Arc::clone(&self.position),
            closed: Arc::clone(&self.closed),
        }))
    }

    async fn start_recording(&mut self) -> Result<mpsc::Receiver<AudioChunk>, CaptureError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CaptureError::StreamLost("stream closed".to_string()));
        }

        // Sub-sessions never overlap; replace any active one.
        self.stop_recording().await?;

        let (tx, rx) = mpsc::channel(32);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let samples = Arc::clone(&self.samples_i16);
        let position = Arc::clone(&self.position);
        let closed = Arc::clone(&self.closed);
        let chunk_ms = self.options.chunk_ms.max(1);
        let chunk_samples = ((self.sample_rate as u64 * chunk_ms) / 1000).max(1) as usize;
        let chunk_period = Duration::from_millis(chunk_ms);
        let realtime = self.options.realtime;

        let handle = tokio::spawn(async move {
            let mut elapsed_ms = 0u64;

            loop {
                if *stop_rx.borrow() || closed.load(Ordering::SeqCst) {
                    break;
                }

                let pos = position.load(Ordering::SeqCst);
                if pos >= samples.len() {
                    // Source exhausted: stay open, emit nothing. The probe
                    // reports silence from here on.
                    tokio::select! {
                        _ = tokio::time::sleep(chunk_period) => continue,
                        _ = stop_rx.changed() => break,
                    }
                }

                let end = (pos + chunk_samples).min(samples.len());
                let data: Vec<u8> = samples[pos..end]
                    .iter()
                    .flat_map(|s| s.to_le_bytes())
                    .collect();
                position.store(end, Ordering::SeqCst);

                let chunk = AudioChunk {
                    data,
                    timestamp_ms: elapsed_ms,
                };
                elapsed_ms += chunk_ms;

                tokio::select! {
                    sent = tx.send(chunk) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                    _ = stop_rx.changed() => break,
                }

                if realtime {
                    tokio::select! {
                        _ = tokio::time::sleep(chunk_period) => {}
                        _ = stop_rx.changed() => break,
                    }
                } else {
                    tokio::task::yield_now().await;
                }
            }

            debug!("File pacing task finished");
        });

        self.pacer = Some((stop_tx, handle));
        Ok(rx)
    }

    async fn stop_recording(&mut self) -> Result<(), CaptureError> {
        if let Some((stop_tx, handle)) = self.pacer.take() {
            let _ = stop_tx.send(true);
            let _ = handle.await;
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.stop_recording().await;
        debug!("File capture stream closed");
    }
}

struct FileSpectrumProbe {
    analyzer: SpectrumAnalyzer,
    samples: Arc<Vec<f32>>,
    position: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl SpectrumProbe for FileSpectrumProbe {
    fn sample(&mut self) -> Result<SpectrumFrame, CaptureError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CaptureError::StreamLost(
                "analysis context closed".to_string(),
            ));
        }

        let pos = self.position.load(Ordering::SeqCst);
        if pos >= self.samples.len() {
            // Nothing is flowing any more.
            return Ok(self.analyzer.snapshot(&[]));
        }

        Ok(self.analyzer.snapshot(&self.samples[..pos]))
    }
}

fn mime_for_path(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("wav")
        .to_ascii_lowercase();
    format!("audio/{}", ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::PCM_MIME_PREFIX;

    fn write_test_wav(path: &Path, samples: &[i16], sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[tokio::test]
    async fn test_stream_emits_pcm_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..3200)
            .map(|i| {
                let t = i as f32 / 16000.0;
                (0.5 * (2.0 * std::f32::consts::PI * 1000.0 * t).sin() * i16::MAX as f32) as i16
            })
            .collect();
        write_test_wav(&path, &samples, 16000);

        let provider = FileCaptureProvider::new(
            &path,
            FileProviderOptions {
                chunk_ms: 50,
                realtime: false,
                fft_size: 256,
            },
        );

        let mut stream = provider
            .request_stream(&StreamConstraints::default())
            .await
            .unwrap();

        assert_eq!(stream.audio_track_count(), 1);
        assert!(stream.mime_type().starts_with(PCM_MIME_PREFIX));

        let mut rx = stream.start_recording().await.unwrap();
        let mut total_bytes = 0usize;
        while let Some(chunk) = rx.recv().await {
            total_bytes += chunk.data.len();
            if total_bytes >= 3200 * 2 {
                break;
            }
        }
        assert_eq!(total_bytes, 3200 * 2);

        stream.close().await;
    }

    #[tokio::test]
    async fn test_probe_sees_tone_then_silence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..1600)
            .map(|i| {
                let t = i as f32 / 16000.0;
                (0.8 * (2.0 * std::f32::consts::PI * 1000.0 * t).sin() * i16::MAX as f32) as i16
            })
            .collect();
        write_test_wav(&path, &samples, 16000);

        let provider = FileCaptureProvider::new(
            &path,
            FileProviderOptions {
                chunk_ms: 50,
                realtime: false,
                fft_size: 256,
            },
        );

        let mut stream = provider
            .request_stream(&StreamConstraints::default())
            .await
            .unwrap();
        let mut probe = stream.spectrum_probe().unwrap();

        // Drain the whole file.
        let mut rx = stream.start_recording().await.unwrap();
        let mut received = 0usize;
        while received < 1600 * 2 {
            let chunk = rx.recv().await.unwrap();
            received += chunk.data.len();
        }

        // Mid-stream the probe reflects the tone... but the playhead has
        // reached the end, so a snapshot now reports silence.
        let frame = probe.sample().unwrap();
        assert!(frame.magnitudes.iter().all(|&m| m == 0.0));

        stream.close().await;
        assert!(matches!(
            probe.sample(),
            Err(CaptureError::StreamLost(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let provider =
            FileCaptureProvider::new("/nonexistent/audio.wav", FileProviderOptions::default());
        let err = provider
            .request_stream(&StreamConstraints::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::Unavailable(_)));
    }
}
