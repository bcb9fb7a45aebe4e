//! Audio capture, analysis, and encoding

use std::sync::atomic::{AtomicU32, Ordering};

mod capture;
mod encoder;
mod level;
mod tone;

pub use capture::{AudioDeviceInfo, CaptureSession, list_devices};
pub use encoder::WavEncoder;
pub use level::{LevelConfig, LevelReport};

pub const WAV_MIME: &str = "audio/wav";

/// A finished, encoded take. Immutable once produced; released by
/// uploading or discarding it.
pub struct Recording {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

/// Lock-free f32 cell for the input gain, shared with the stream callback.
pub struct GainCell(AtomicU32);

impl GainCell {
    pub const fn new(gain: f32) -> Self {
        Self(AtomicU32::new(gain.to_bits()))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, gain: f32) {
        self.0.store(gain.to_bits(), Ordering::Relaxed);
    }
}

// Process-wide default gain; every gain change updates it and new sessions
// seed from it.
static DEFAULT_GAIN: GainCell = GainCell::new(2.0);

pub fn default_gain() -> f32 {
    DEFAULT_GAIN.get()
}

pub fn set_default_gain(gain: f32) {
    DEFAULT_GAIN.set(gain);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_cell_round_trip() {
        let cell = GainCell::new(2.0);
        assert_eq!(cell.get(), 2.0);
        cell.set(3.5);
        assert_eq!(cell.get(), 3.5);
    }
}
