//! Per-batch loudness analysis and silence detection
//!
//! Loudness is the peak absolute sample amplitude of a batch of linear PCM
//! samples in [-1.0, 1.0]; all thresholds are in the same linear amplitude
//! unit. Each input callback delivers one batch, so one call to
//! [`LevelAnalyzer::tick`] corresponds to one analysis tick.

use std::time::{Duration, Instant};

/// Analyzer thresholds, in linear amplitude units.
#[derive(Debug, Clone, Copy)]
pub struct LevelConfig {
    /// Below this a batch counts as silence.
    pub silence_threshold: f32,
    /// Continuous silence longer than this triggers auto-stop.
    pub silence_window: Duration,
    /// At or above this a batch is flagged loud for the meter; never
    /// affects the stop decision.
    pub loud_threshold: f32,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 0.1,
            silence_window: Duration::from_millis(1500),
            loud_threshold: 0.75,
        }
    }
}

/// What one analysis tick observed.
#[derive(Debug, Clone, Copy)]
pub struct LevelReport {
    pub peak: f32,
    pub is_loud: bool,
    pub should_stop: bool,
}

/// Tracks the last time a batch rose above the silence threshold and
/// signals stop once the silence window has elapsed.
pub struct LevelAnalyzer {
    config: LevelConfig,
    last_sound: Option<Instant>,
}

impl LevelAnalyzer {
    pub fn new(config: LevelConfig) -> Self {
        Self {
            config,
            last_sound: None,
        }
    }

    /// Analyze one batch of samples observed at `now`.
    ///
    /// The first tick seeds the last-sound timestamp, so silence that
    /// accumulated before the stream stabilized is not counted against
    /// the window.
    pub fn tick(&mut self, batch: &[f32], now: Instant) -> LevelReport {
        let peak = batch.iter().fold(0.0f32, |max, &s| max.max(s.abs()));

        let last_sound = *self.last_sound.get_or_insert(now);
        let should_stop = if peak >= self.config.silence_threshold {
            self.last_sound = Some(now);
            false
        } else {
            now.duration_since(last_sound) > self.config.silence_window
        };

        LevelReport {
            peak,
            is_loud: peak >= self.config.loud_threshold,
            should_stop,
        }
    }

}
