//! WAV container encoding
//!
//! Turns the batches collected during a take into a self-contained mono
//! 16-bit PCM WAV buffer: the canonical 44-byte header followed by one
//! little-endian i16 per sample, batches concatenated in arrival order.

use anyhow::{Result, ensure};
use hound::{WavSpec, WavWriter};
use std::io::Cursor;

use super::{Recording, WAV_MIME};

pub struct WavEncoder {
    sample_rate: u32,
}

impl WavEncoder {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    /// Encode batches of linear float samples in [-1.0, 1.0].
    ///
    /// Samples are clamped before the 0x7FFF scale so over-unity gain
    /// saturates instead of wrapping.
    pub fn encode(&self, batches: &[Vec<f32>]) -> Result<Recording> {
        ensure!(
            batches.iter().any(|batch| !batch.is_empty()),
            "no audio captured from input device"
        );

        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec)?;
            for batch in batches {
                for &sample in batch {
                    let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    writer.write_sample(scaled)?;
                }
            }
            writer.finalize()?;
        }

        Ok(Recording {
            bytes: cursor.into_inner(),
            mime: WAV_MIME,
        })
    }
}
