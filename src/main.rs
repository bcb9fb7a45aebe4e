mod audio;
mod client;
mod meter;
mod prompts;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::LevelConfig;
use crate::client::{OutputFormat, RecordOptions};
use crate::server::{DEFAULT_MAX_UPLOAD_BYTES, ServeOptions};

#[derive(Parser)]
#[command(name = "voicebank")]
#[command(about = "Crowd-sourced voice recording collector")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the collection server
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8000")]
        listen: String,

        /// Prompt list file (one `bucket-id sentence` per line)
        #[arg(long, default_value = "sentences.txt")]
        prompts: PathBuf,

        /// Directory holding one bucket per prompt
        #[arg(long, default_value = "uploads")]
        storage_root: PathBuf,

        /// Maximum accepted upload size in bytes
        #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
        max_upload_bytes: usize,
    },

    /// Record one prompted sentence and upload it
    Record {
        /// Collection server base URL
        #[arg(long, default_value = "http://127.0.0.1:8000")]
        server: String,

        /// Record this bucket instead of a random prompt
        #[arg(long)]
        bucket: Option<String>,

        /// Microphone gain multiplier (also becomes the new default)
        #[arg(long)]
        gain: Option<f32>,

        /// Maximum recording duration in seconds
        #[arg(long, default_value_t = 30)]
        max_duration: u64,

        /// Peak amplitude below which a batch counts as silence
        #[arg(long, default_value_t = 0.1)]
        silence_threshold: f32,

        /// Continuous silence that ends the recording, in milliseconds
        #[arg(long, default_value_t = 1500)]
        silence_ms: u64,

        /// Output format for the upload summary
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List available audio recording devices
    Devices,
}

fn init_logging() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            listen,
            prompts,
            storage_root,
            max_upload_bytes,
        } => {
            server::run(ServeOptions {
                listen,
                prompts,
                storage_root,
                max_upload_bytes,
            })
            .await
        }

        Commands::Record {
            server,
            bucket,
            gain,
            max_duration,
            silence_threshold,
            silence_ms,
            format,
        } => {
            client::run(RecordOptions {
                server,
                bucket,
                gain,
                max_duration: Duration::from_secs(max_duration),
                level: LevelConfig {
                    silence_threshold,
                    silence_window: Duration::from_millis(silence_ms),
                    ..LevelConfig::default()
                },
                format,
            })
            .await
        }

        Commands::Devices => {
            let devices = audio::list_devices()?;

            println!("Available Audio Devices:");
            println!(
                "{:<30} {:<10} {:<20} Formats",
                "Name", "Default", "Sample Rates"
            );
            println!("{}", "-".repeat(80));

            for device in devices {
                let default_str = if device.is_default { "YES" } else { "NO" };
                let sample_rates = device
                    .supported_sample_rates
                    .iter()
                    .take(3)
                    .map(|sr| sr.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");

                let formats = device
                    .supported_formats
                    .iter()
                    .take(2)
                    .map(|f| format!("{:?}", f))
                    .collect::<Vec<_>>()
                    .join(", ");

                println!(
                    "{:<30} {:<10} {:<20} {}",
                    &device.name[..device.name.len().min(30)],
                    default_str,
                    sample_rates,
                    formats
                );
            }
            Ok(())
        }
    }
}
