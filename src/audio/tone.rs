//! Indicator tone playback
//!
//! A short synthesized cue marks the start and end of a take so the
//! participant knows when the microphone is live. Playback runs on its own
//! thread; the start tone reports completion back to the caller because
//! capture must not begin until the cue has finished sounding.

use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::sync::mpsc;
use std::time::Duration;
use tracing::warn;

const START_TONE_HZ: f32 = 800.0;
const START_TONE: Duration = Duration::from_millis(200);
const STOP_TONE_HZ: f32 = 400.0;
const STOP_TONE: Duration = Duration::from_millis(300);
const TONE_VOLUME: f32 = 0.5;

enum ToneCommand {
    Start { done: mpsc::Sender<()> },
    Stop,
}

/// Handle to the tone playback thread.
///
/// Degrades gracefully: with no audio output device the cues are skipped
/// and capture proceeds without them.
pub struct TonePlayer {
    tx: mpsc::Sender<ToneCommand>,
}

impl TonePlayer {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            // The output stream must live on this thread.
            let output = OutputStream::try_default();
            let handle = match &output {
                Ok((_stream, handle)) => Some(handle.clone()),
                Err(e) => {
                    warn!(error = %e, "no audio output device, indicator tones disabled");
                    None
                }
            };

            for command in rx {
                match command {
                    ToneCommand::Start { done } => {
                        if let Some(handle) = &handle {
                            play_tone(handle, START_TONE_HZ, START_TONE);
                        }
                        let _ = done.send(());
                    }
                    ToneCommand::Stop => {
                        if let Some(handle) = &handle {
                            play_tone(handle, STOP_TONE_HZ, STOP_TONE);
                        }
                    }
                }
            }
        });

        Self { tx }
    }

    /// Play the start cue and wait for it to finish.
    pub fn play_start_blocking(&self) {
        let (done_tx, done_rx) = mpsc::channel();
        if self.tx.send(ToneCommand::Start { done: done_tx }).is_ok() {
            let _ = done_rx.recv();
        }
    }

    /// Queue the stop cue without waiting for it.
    pub fn play_stop(&self) {
        let _ = self.tx.send(ToneCommand::Stop);
    }
}

fn play_tone(handle: &OutputStreamHandle, hertz: f32, duration: Duration) {
    let Ok(sink) = Sink::try_new(handle) else {
        return;
    };
    sink.append(
        rodio::source::SineWave::new(hertz)
            .take_duration(duration)
            .amplify(TONE_VOLUME),
    );
    sink.sleep_until_end();
}
