//! Microphone capture session
//!
//! Wraps a cpal input stream in an explicit state machine:
//!
//! ```text
//! Idle --start()--> StartPending --tone done--> Recording --stop()/auto-stop--> Idle
//! ```
//!
//! The input stream is built only after the start cue has finished, so
//! neither the cue nor anything before it lands in the take buffer. Each
//! input callback is one analysis tick: it applies the gain stage, buffers
//! the batch, runs the level analyzer, and raises the auto-stop flag when
//! the silence window elapses. cpal delivers callbacks serially, so ticks
//! are never concurrent.

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use super::level::{LevelAnalyzer, LevelConfig, LevelReport};
use super::tone::TonePlayer;
use super::{GainCell, Recording, WavEncoder, default_gain, set_default_gain};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    /// Start requested, waiting for the start cue to finish.
    StartPending,
    Recording,
}

/// Shared state of the take in progress.
struct ActiveTake {
    batches: Arc<Mutex<Vec<Vec<f32>>>>,
    auto_stop: Arc<AtomicBool>,
}

pub struct CaptureSession {
    device: Device,
    config: StreamConfig,
    sample_rate: u32,
    channels: usize,
    level: LevelConfig,
    gain: Arc<GainCell>,
    tones: TonePlayer,
    state: CaptureState,
    stream: Option<cpal::Stream>,
    take: Option<ActiveTake>,
}

impl CaptureSession {
    /// Open the default input device, seeding gain from the process-wide
    /// default.
    pub fn new(level: LevelConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No default input device found"))?;

        let supported = device.default_input_config()?;
        let sample_rate = supported.sample_rate().0;
        let channels = (supported.channels() as usize).max(1);
        let config: StreamConfig = supported.into();

        Ok(Self {
            device,
            config,
            sample_rate,
            channels,
            level,
            gain: Arc::new(GainCell::new(default_gain())),
            tones: TonePlayer::spawn(),
            state: CaptureState::Idle,
            stream: None,
            take: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    /// Change the input gain. Takes effect on the next batch and becomes
    /// the seed for future sessions.
    pub fn set_gain(&mut self, gain: f32) {
        self.gain.set(gain);
        set_default_gain(gain);
    }

    /// Begin a take. No-op when a take is already running.
    ///
    /// Blocks for the duration of the start cue, then starts the input
    /// stream. Level reports go out on `levels` once per batch; the
    /// channel is dropped when the take ends.
    pub fn start(&mut self, levels: UnboundedSender<LevelReport>) -> Result<()> {
        if self.state != CaptureState::Idle {
            return Ok(());
        }

        self.state = CaptureState::StartPending;
        self.tones.play_start_blocking();

        let batches = Arc::new(Mutex::new(Vec::new()));
        let auto_stop = Arc::new(AtomicBool::new(false));
        let mut analyzer = LevelAnalyzer::new(self.level);

        let gain = Arc::clone(&self.gain);
        let channels = self.channels;
        let batches_in = Arc::clone(&batches);
        let stop_in = Arc::clone(&auto_stop);
        let stop_on_error = Arc::clone(&auto_stop);

        let result = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let gain = gain.get();
                // Downmix interleaved frames to mono and apply the gain
                // stage before anything else sees the samples.
                let batch: Vec<f32> = data
                    .chunks(channels)
                    .map(|frame| frame[0] * gain)
                    .collect();

                let report = analyzer.tick(&batch, Instant::now());
                if report.should_stop {
                    stop_in.store(true, Ordering::Release);
                }
                let _ = levels.send(report);

                if let Ok(mut all) = batches_in.lock() {
                    all.push(batch);
                }
            },
            move |err| {
                warn!(error = %err, "input stream error, ending take");
                stop_on_error.store(true, Ordering::Release);
            },
            None,
        );

        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                self.state = CaptureState::Idle;
                return Err(e.into());
            }
        };
        if let Err(e) = stream.play() {
            self.state = CaptureState::Idle;
            return Err(e.into());
        }

        self.stream = Some(stream);
        self.take = Some(ActiveTake { batches, auto_stop });
        self.state = CaptureState::Recording;
        Ok(())
    }

    /// True once the analyzer has signalled the end of the take.
    pub fn should_stop(&self) -> bool {
        self.take
            .as_ref()
            .map(|take| take.auto_stop.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// End the take and encode it. No-op (`None`) when not recording.
    ///
    /// Sample collection halts immediately; the stop cue plays in
    /// parallel and the returned recording never waits for it.
    pub fn stop(&mut self) -> Result<Option<Recording>> {
        if self.state != CaptureState::Recording {
            return Ok(None);
        }

        // Dropping the stream stops the input callback.
        self.stream = None;
        self.state = CaptureState::Idle;
        self.tones.play_stop();

        let Some(take) = self.take.take() else {
            return Ok(None);
        };
        let batches = match Arc::try_unwrap(take.batches) {
            Ok(mutex) => mutex.into_inner().unwrap_or_default(),
            // A final in-flight callback may still hold its clone.
            Err(shared) => shared.lock().map(|b| b.clone()).unwrap_or_default(),
        };

        let recording = WavEncoder::new(self.sample_rate).encode(&batches)?;
        Ok(Some(recording))
    }
}

/// Information about an available audio input device.
#[derive(Debug)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub supported_sample_rates: Vec<u32>,
    pub supported_formats: Vec<SampleFormat>,
}

/// List all available audio input devices.
pub fn list_devices() -> Result<Vec<AudioDeviceInfo>> {
    let host = cpal::default_host();
    let devices = host.input_devices()?;
    let default_device = host.default_input_device();

    let mut device_infos = Vec::new();

    for device in devices {
        let name = device.name().unwrap_or("Unknown Device".to_string());
        let is_default = default_device
            .as_ref()
            .map(|d| d.name().unwrap_or_default() == name)
            .unwrap_or(false);

        let supported_sample_rates = device
            .supported_input_configs()?
            .map(|c| c.max_sample_rate().0)
            .collect();

        let supported_formats = device
            .supported_input_configs()?
            .map(|c| c.sample_format())
            .collect();

        device_infos.push(AudioDeviceInfo {
            name,
            is_default,
            supported_sample_rates,
            supported_formats,
        });
    }

    Ok(device_infos)
}
