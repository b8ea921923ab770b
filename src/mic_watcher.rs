//! Mic energy watcher — §4.C.
//!
//! Grounded on `examples/original_source/lib/micenergywatcher.py`
//! (`struct.unpack` int16 RMS² against an effective, mode-dependent
//! threshold). Reuses the teacher's `audio::Capturer` for the actual device
//! I/O instead of a raw blocking read loop — `Capturer` already runs its own
//! drain/callback threads (`audio/capture.rs`), so the watcher only needs to
//! supply a callback that reframes the incoming f32 stream into fixed
//! `frame_size` windows and does the RMS² comparison.
//!
//! `Capturer`'s samples are normalized f32 in `[-1, 1]`; they're rescaled to
//! int16 magnitude before squaring so the configured thresholds stay
//! comparable to the Python original's raw PCM16 values.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::audio::Capturer;
use crate::signals::BargeController;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "kebab-case")]
pub enum MicWatchMode {
    Always,
    HighThreshWhileTts,
    Disabled,
}

#[derive(Debug, Clone, Copy)]
pub struct MicWatcherConfig {
    pub sample_rate: u32,
    pub frame_size: usize,
    pub base_thresh: i64,
    pub sustain_ms: f32,
    pub mode: MicWatchMode,
}

impl Default for MicWatcherConfig {
    fn default() -> Self {
        Self { sample_rate: 16_000, frame_size: 2048, base_thresh: 6_000, sustain_ms: 450.0, mode: MicWatchMode::HighThreshWhileTts }
    }
}

struct WatcherState {
    leftover: Vec<f32>,
    voiced_ms: f32,
}

/// Owns the underlying capture device. `None` means the mic failed to open
/// at construction time — per §4.C / §7 that disables the watcher silently
/// rather than failing startup.
pub struct MicEnergyWatcher {
    capturer: Option<Capturer>,
}

impl MicEnergyWatcher {
    pub fn new(config: MicWatcherConfig, controller: Arc<BargeController>) -> Self {
        let frame_ms = 1000.0 * config.frame_size as f32 / config.sample_rate as f32;
        let state = Arc::new(Mutex::new(WatcherState { leftover: Vec::with_capacity(config.frame_size * 2), voiced_ms: 0.0 }));

        let capturer = Capturer::new(config.sample_rate, move |samples: &[f32]| {
            let mut state = state.lock();
            state.leftover.extend_from_slice(samples);

            while state.leftover.len() >= config.frame_size {
                let frame: Vec<f32> = state.leftover.drain(..config.frame_size).collect();
                let rms2 = frame_rms_squared(&frame);
                let thresh = effective_threshold(config, &controller);

                if rms2 as f64 > thresh {
                    state.voiced_ms += frame_ms;
                } else {
                    state.voiced_ms = (state.voiced_ms - 2.0 * frame_ms).max(0.0);
                }

                if state.voiced_ms >= config.sustain_ms {
                    controller.request_barge();
                    state.voiced_ms = 0.0;
                }
            }
        });

        match capturer {
            Ok(mut capturer) => {
                if let Err(e) = capturer.start() {
                    warn!("mic energy watcher: failed to start capture, watcher disabled: {e}");
                    return Self { capturer: None };
                }
                info!("mic energy watcher started (mode={:?})", config.mode);
                Self { capturer: Some(capturer) }
            }
            Err(e) => {
                warn!("mic energy watcher: failed to open input device, watcher disabled: {e}");
                Self { capturer: None }
            }
        }
    }

    pub fn shutdown(&mut self) {
        if let Some(capturer) = self.capturer.as_mut() {
            capturer.shutdown();
        }
    }
}

impl Drop for MicEnergyWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn frame_rms_squared(frame: &[f32]) -> i64 {
    let sum: i64 = frame
        .iter()
        .map(|&s| {
            let scaled = (s * 32768.0) as i64;
            scaled * scaled
        })
        .sum();
    sum / frame.len().max(1) as i64
}

fn effective_threshold(config: MicWatcherConfig, controller: &BargeController) -> f64 {
    match config.mode {
        MicWatchMode::Disabled => f64::MAX,
        MicWatchMode::Always => config.base_thresh as f64,
        MicWatchMode::HighThreshWhileTts => {
            if controller.is_ai_speaking() {
                4.0 * config.base_thresh as f64
            } else {
                config.base_thresh as f64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_thresh_mode_quadruples_while_ai_speaking() {
        let config = MicWatcherConfig { mode: MicWatchMode::HighThreshWhileTts, base_thresh: 1000, ..Default::default() };
        let controller = BargeController::new();

        assert_eq!(effective_threshold(config, &controller), 1000.0);
        controller.set_ai_speaking(true);
        assert_eq!(effective_threshold(config, &controller), 4000.0);
    }

    #[test]
    fn disabled_mode_is_effectively_infinite() {
        let config = MicWatcherConfig { mode: MicWatchMode::Disabled, base_thresh: 1000, ..Default::default() };
        let controller = BargeController::new();
        assert_eq!(effective_threshold(config, &controller), f64::MAX);
    }

    #[test]
    fn always_mode_ignores_ai_speaking() {
        let config = MicWatcherConfig { mode: MicWatchMode::Always, base_thresh: 1000, ..Default::default() };
        let controller = BargeController::new();
        controller.set_ai_speaking(true);
        assert_eq!(effective_threshold(config, &controller), 1000.0);
    }

    #[test]
    fn silent_frame_has_zero_rms() {
        let frame = vec![0.0f32; 2048];
        assert_eq!(frame_rms_squared(&frame), 0);
    }

    #[test]
    fn full_scale_frame_has_large_rms() {
        let frame = vec![1.0f32; 2048];
        assert!(frame_rms_squared(&frame) > 1_000_000_000);
    }
}
