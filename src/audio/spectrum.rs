// Frequency-domain snapshots for silence classification
//
// A SpectrumAnalyzer turns the most recent window of PCM samples into a
// magnitude spectrum. The silence detector reduces that spectrum to a single
// energy number, optionally restricted to a speech sub-band, and compares it
// against a configured threshold.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// One magnitude-spectrum snapshot of an audio track.
///
/// Bin magnitudes are scaled so a full-scale sinusoid peaks near 255, which
/// keeps configured energy thresholds in a small familiar range.
#[derive(Debug, Clone)]
pub struct SpectrumFrame {
    /// Magnitudes for bins `0..=fft_size/2` (DC through Nyquist).
    pub magnitudes: Vec<f32>,
    /// Width of one bin in Hz (`sample_rate / fft_size`).
    pub bin_hz: f32,
}

impl SpectrumFrame {
    /// Mean magnitude across the given frequency band, or across all bins
    /// when `band` is `None` (broadband fallback).
    pub fn band_energy(&self, band: Option<(f32, f32)>) -> f32 {
        let bins: Vec<f32> = match band {
            Some((low_hz, high_hz)) => self
                .magnitudes
                .iter()
                .enumerate()
                .filter(|(i, _)| {
                    let freq = *i as f32 * self.bin_hz;
                    freq >= low_hz && freq <= high_hz
                })
                .map(|(_, &m)| m)
                .collect(),
            None => self.magnitudes.clone(),
        };

        if bins.is_empty() {
            return 0.0;
        }
        bins.iter().sum::<f32>() / bins.len() as f32
    }
}

/// Windowed FFT over the most recent chunk of samples.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    window_sum: f32,
    fft_size: usize,
    sample_rate: u32,
}

impl SpectrumAnalyzer {
    pub fn new(fft_size: usize, sample_rate: u32) -> Self {
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let window = hann_window(fft_size);
        let window_sum: f32 = window.iter().sum();

        Self {
            fft,
            window,
            window_sum,
            fft_size,
            sample_rate,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Compute the magnitude spectrum of the trailing `fft_size` samples.
    ///
    /// Shorter inputs are zero-padded at the front, so an empty slice yields
    /// an all-zero spectrum (classified as silence downstream).
    pub fn snapshot(&self, samples: &[f32]) -> SpectrumFrame {
        let tail = if samples.len() > self.fft_size {
            &samples[samples.len() - self.fft_size..]
        } else {
            samples
        };

        let pad = self.fft_size - tail.len();
        let mut buffer: Vec<Complex<f32>> = (0..self.fft_size)
            .map(|i| {
                let sample = if i < pad { 0.0 } else { tail[i - pad] };
                Complex {
                    re: sample * self.window[i],
                    im: 0.0,
                }
            })
            .collect();

        self.fft.process(&mut buffer);

        // Single-sided spectrum, corrected for window gain and scaled so a
        // full-scale tone lands near 255.
        let magnitudes: Vec<f32> = buffer[..self.fft_size / 2 + 1]
            .iter()
            .map(|c| 255.0 * 2.0 * c.norm() / self.window_sum)
            .collect();

        SpectrumFrame {
            magnitudes,
            bin_hz: self.sample_rate as f32 / self.fft_size as f32,
        }
    }
}

fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let x = (std::f32::consts::PI * i as f32) / (len as f32 - 1.0);
            x.sin().powi(2)
        })
        .collect()
}
