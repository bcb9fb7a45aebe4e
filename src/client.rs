//! Capture client
//!
//! Fetches the prompt listing, records one take with the live meter, and
//! uploads it. Manual stop (Enter) and silence auto-stop are equivalent;
//! either way the take is finalized in full or not at all.

use anyhow::{Context, Result, anyhow, bail};
use reqwest::header::CONTENT_TYPE;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::unbounded_channel;
use tracing::info;
use uuid::Uuid;

use crate::audio::{CaptureSession, LevelConfig, Recording};
use crate::meter::LevelMeter;

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum OutputFormat {
    Text,
    Json,
}

pub struct RecordOptions {
    pub server: String,
    pub bucket: Option<String>,
    pub gain: Option<f32>,
    pub max_duration: Duration,
    pub level: LevelConfig,
    pub format: OutputFormat,
}

pub async fn run(opts: RecordOptions) -> Result<()> {
    let server = opts.server.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();

    let sentences: HashMap<String, String> = client
        .get(format!("{}/sentences.json", server))
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("failed to fetch prompt list from {}", server))?
        .json()
        .await
        .context("prompt list is not valid JSON")?;
    if sentences.is_empty() {
        bail!("the server has no prompts configured");
    }

    let (bucket, sentence) = match &opts.bucket {
        Some(id) => {
            let text = sentences
                .get(id)
                .ok_or_else(|| anyhow!("the server has no bucket named '{}'", id))?;
            (id.clone(), text.clone())
        }
        None => pick_prompt(&sentences).ok_or_else(|| anyhow!("no prompt available"))?,
    };

    println!();
    println!("Please read aloud:");
    println!();
    println!("    {}", sentence);
    println!();
    println!(
        "Recording starts after the tone and stops after {:.1}s of silence",
        opts.level.silence_window.as_secs_f32()
    );
    println!("(or press Enter to stop).");
    println!();

    let recording = capture_take(&opts).await?;
    let byte_count = recording.bytes.len();
    info!(bytes = byte_count, mime = recording.mime, "take finalized");

    // One session id per run, carried as the legacy uid header.
    let uid = Uuid::new_v4();
    let response = client
        .post(format!("{}/upload/{}", server, bucket))
        .header(CONTENT_TYPE, recording.mime)
        .header("uid", uid.to_string())
        .body(recording.bytes)
        .send()
        .await
        .with_context(|| format!("failed to upload recording to {}", server))?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        bail!("upload rejected: {} {}", status, body.trim());
    }

    match opts.format {
        OutputFormat::Text => println!("{}", body.trim()),
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "bucket": bucket,
                "bytes": byte_count,
                "ack": body.trim(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}

/// Run one capture session to completion and return the encoded take.
async fn capture_take(opts: &RecordOptions) -> Result<Recording> {
    let mut session = CaptureSession::new(opts.level)?;
    if let Some(gain) = opts.gain {
        session.set_gain(gain);
    }
    info!(sample_rate = session.sample_rate(), "microphone ready");

    let (levels_tx, mut levels_rx) = unbounded_channel();
    let meter = LevelMeter::new(opts.level.silence_threshold);
    let meter_task = tokio::spawn(async move {
        while let Some(report) = levels_rx.recv().await {
            meter.update(&report);
        }
        meter.clear();
    });

    let stop_requested = Arc::new(AtomicBool::new(false));
    spawn_enter_listener(Arc::clone(&stop_requested));

    session.start(levels_tx)?;
    let started = Instant::now();

    while session.is_recording() {
        if stop_requested.load(Ordering::Acquire) || session.should_stop() {
            break;
        }
        if started.elapsed() >= opts.max_duration {
            info!("maximum take length reached");
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    let recording = session
        .stop()?
        .ok_or_else(|| anyhow!("capture session produced no recording"))?;

    // Stopping dropped the stream and with it the level sender, so the
    // meter task drains and clears the bar.
    let _ = meter_task.await;
    Ok(recording)
}

/// Set the stop flag when the user presses Enter.
fn spawn_enter_listener(stop_requested: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        stop_requested.store(true, Ordering::Release);
    });
}

/// Pick a prompt uniformly. A v4 uuid stands in for an RNG so the
/// selection needs no extra dependency.
fn pick_prompt(sentences: &HashMap<String, String>) -> Option<(String, String)> {
    if sentences.is_empty() {
        return None;
    }
    let index = (Uuid::new_v4().as_u128() % sentences.len() as u128) as usize;
    sentences
        .iter()
        .nth(index)
        .map(|(id, text)| (id.clone(), text.clone()))
}
