//! Terminal level meter
//!
//! Renders analyzer reports as a progress-style bar: silence leaves the
//! bar empty, the fill grows linearly with the peak level, and the bar
//! switches style once the loud threshold is crossed. Rendering consumes
//! a channel the capture path never blocks on, so a dropped frame never
//! drops audio.

use indicatif::{ProgressBar, ProgressStyle};

use crate::audio::LevelReport;

/// Width of the meter in ticks; the full scale maps level 1.0 to the
/// rightmost tick.
pub const METER_TICKS: u64 = 40;

/// Map a linear level to a bar position. Levels below the silence
/// threshold render as empty.
pub fn level_to_ticks(peak: f32, silence_threshold: f32) -> u64 {
    if peak < silence_threshold {
        return 0;
    }
    (peak.clamp(0.0, 1.0) * METER_TICKS as f32).round() as u64
}

pub struct LevelMeter {
    bar: ProgressBar,
    normal: ProgressStyle,
    loud: ProgressStyle,
    silence_threshold: f32,
}

impl LevelMeter {
    pub fn new(silence_threshold: f32) -> Self {
        let normal = ProgressStyle::default_bar()
            .template("  {bar:40.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        let loud = ProgressStyle::default_bar()
            .template("  {bar:40.red} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        let bar = ProgressBar::new(METER_TICKS);
        bar.set_style(normal.clone());

        Self {
            bar,
            normal,
            loud,
            silence_threshold,
        }
    }

    pub fn update(&self, report: &LevelReport) {
        let style = if report.is_loud {
            self.loud.clone()
        } else {
            self.normal.clone()
        };
        self.bar.set_style(style);
        self.bar
            .set_position(level_to_ticks(report.peak, self.silence_threshold));
    }

    pub fn clear(&self) {
        self.bar.finish_and_clear();
    }
}
