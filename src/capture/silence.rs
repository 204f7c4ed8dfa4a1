// Silence detection with hysteresis
//
// The detector classifies a live audio track as speaking or silent from
// periodic spectrum snapshots. A silence edge fires only after the energy
// stays below threshold for both a minimum number of consecutive polls and
// a minimum wall-clock duration, so brief dips never split an utterance.
// Edges strictly alternate: silence, speech-resumed, silence, ...

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::provider::SpectrumProbe;
use crate::audio::SpectrumFrame;
use crate::error::CaptureError;

/// Tuning for silence classification.
///
/// Threshold units are linear mean band magnitude as produced by
/// `SpectrumFrame::band_energy`. Observed capture gain differs per desktop
/// OS, so defaults are resolved by the configuration layer, not here.
#[derive(Debug, Clone)]
pub struct SilenceConfig {
    /// Energy at or above this value counts as speech.
    pub threshold_energy: f32,
    /// Wall-clock time the energy must stay below threshold before a
    /// silence edge fires.
    pub silence_duration_ms: u64,
    /// Polling cadence for spectrum snapshots.
    pub poll_interval_ms: u64,
    /// Minimum consecutive sub-threshold polls before a silence edge may
    /// fire, independent of elapsed time.
    pub min_silent_frames: u32,
    /// Speech sub-band in Hz; `None` falls back to broadband energy.
    pub band: Option<(f32, f32)>,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            threshold_energy: 10.0,
            silence_duration_ms: 1500,
            poll_interval_ms: 100,
            min_silent_frames: 3,
            band: Some((300.0, 3400.0)),
        }
    }
}

/// A detected transition between speaking and silent states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilenceEdge {
    /// Sustained silence confirmed; the current utterance has ended.
    Silence,
    /// Energy rose above threshold after a confirmed silence.
    SpeechResumed,
}

/// Event stream from the detector task to the recorder.
#[derive(Debug)]
pub enum DetectorEvent {
    Edge(SilenceEdge),
    /// The audio track disappeared mid-poll; the detector has stopped.
    StreamLost(CaptureError),
}

/// Per-frame silence state machine.
///
/// `observe` is the only mutator; feeding it energies in timestamp order
/// yields at most one edge per transition.
pub struct SilenceDetector {
    config: SilenceConfig,
    consecutive_silent: u32,
    silence_onset: Option<Instant>,
    is_silent: bool,
}

impl SilenceDetector {
    pub fn new(config: SilenceConfig) -> Self {
        Self {
            config,
            consecutive_silent: 0,
            silence_onset: None,
            is_silent: false,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.is_silent
    }

    /// Reduce a spectrum snapshot to the configured energy measure.
    pub fn energy(&self, frame: &SpectrumFrame) -> f32 {
        frame.band_energy(self.config.band)
    }

    /// Feed one energy sample; returns an edge iff a transition confirmed.
    pub fn observe(&mut self, energy: f32, now: Instant) -> Option<SilenceEdge> {
        if energy < self.config.threshold_energy {
            self.consecutive_silent = self.consecutive_silent.saturating_add(1);
            let onset = *self.silence_onset.get_or_insert(now);

            let held_long_enough = now.duration_since(onset)
                >= Duration::from_millis(self.config.silence_duration_ms);
            let enough_frames = self.consecutive_silent >= self.config.min_silent_frames;

            if !self.is_silent && held_long_enough && enough_frames {
                self.is_silent = true;
                debug!(
                    "Silence confirmed after {} sub-threshold polls",
                    self.consecutive_silent
                );
                return Some(SilenceEdge::Silence);
            }
            None
        } else {
            // A single loud frame resets the debounce entirely.
            self.consecutive_silent = 0;
            self.silence_onset = None;

            if self.is_silent {
                self.is_silent = false;
                debug!("Speech resumed (energy {:.1})", energy);
                return Some(SilenceEdge::SpeechResumed);
            }
            None
        }
    }

    /// Forget accumulated state (used when capture restarts).
    pub fn reset(&mut self) {
        self.consecutive_silent = 0;
        self.silence_onset = None;
        self.is_silent = false;
    }
}

/// Drive a detector from a spectrum probe on a fixed polling cadence.
///
/// Each poll is synchronous and completes before the next is scheduled.
/// When the probe reports the track gone, the task emits `StreamLost` and
/// stops polling instead of erroring silently.
pub(crate) fn spawn_detector(
    mut probe: Box<dyn SpectrumProbe>,
    config: SilenceConfig,
    events: mpsc::Sender<DetectorEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let poll_interval = Duration::from_millis(config.poll_interval_ms.max(1));
        let mut detector = SilenceDetector::new(config);
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let frame = match probe.sample() {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("Spectrum probe failed: {}", e);
                            let _ = events.send(DetectorEvent::StreamLost(e)).await;
                            break;
                        }
                    };

                    let energy = detector.energy(&frame);
                    if let Some(edge) = detector.observe(energy, Instant::now()) {
                        if events.send(DetectorEvent::Edge(edge)).await.is_err() {
                            break; // recorder gone
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        debug!("Silence detector stopped");
    })
}
