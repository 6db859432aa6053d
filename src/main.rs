//! Screen recorder CLI
//!
//! Runs a recording session against the simulated media platform.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use screen_recorder_lib::capture::simulated::{ChunkMode, DeviceResponse, SimulatedDevices, SimulatedPlatform};
use screen_recorder_lib::commands::recording::{self, RecorderState};
use screen_recorder_lib::config::{default_config_path, load_config, save_config, RecorderConfig};
use screen_recorder_lib::export::DirectoryDownloads;
use screen_recorder_lib::recorder::{RecordingPhase, RecordingQuality};
use screen_recorder_lib::RecorderHandle;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Record the screen, microphone and webcam into a single file
#[derive(Parser)]
#[command(name = "screen-recorder")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true, env = "SCREEN_RECORDER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one session
    Record(RecordArgs),

    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args)]
struct RecordArgs {
    /// Stop after this many seconds (Ctrl-C stops earlier)
    #[arg(short, long, default_value_t = 5)]
    duration_secs: u64,

    /// Record the microphone
    #[arg(long, overrides_with = "no_mic")]
    mic: bool,

    /// Do not record the microphone
    #[arg(long)]
    no_mic: bool,

    /// Record the webcam
    #[arg(long)]
    webcam: bool,

    #[arg(short, long, value_enum)]
    quality: Option<Quality>,

    /// Keep the recording in memory instead of saving it
    #[arg(long)]
    no_auto_download: bool,

    /// Where to save the recording
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Deny the screen share prompt
    #[arg(long)]
    deny_display: bool,

    /// Deny the microphone prompt
    #[arg(long)]
    deny_mic: bool,

    /// Deny the camera prompt
    #[arg(long)]
    deny_webcam: bool,

    /// Share system audio along with the screen
    #[arg(long)]
    system_audio: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Quality {
    High,
    Medium,
    Low,
}

impl From<Quality> for RecordingQuality {
    fn from(quality: Quality) -> Self {
        match quality {
            Quality::High => RecordingQuality::High,
            Quality::Medium => RecordingQuality::Medium,
            Quality::Low => RecordingQuality::Low,
        }
    }
}

fn response(response: DeviceResponse, deny: bool) -> DeviceResponse {
    if deny {
        DeviceResponse::Deny
    } else {
        response
    }
}

async fn record(mut config: RecorderConfig, args: RecordArgs) -> Result<()> {
    let mut settings = config.settings;
    if args.mic {
        settings.enable_mic = true;
    }
    if args.no_mic {
        settings.enable_mic = false;
    }
    settings.enable_webcam |= args.webcam;
    if let Some(quality) = args.quality {
        settings.recording_quality = quality.into();
    }
    if args.no_auto_download {
        settings.auto_download = false;
    }
    if let Some(dir) = args.output_dir {
        config.download_dir = dir;
    }

    let defaults = SimulatedDevices::default();
    let platform = SimulatedPlatform::new(SimulatedDevices {
        display: response(defaults.display, args.deny_display),
        microphone: response(defaults.microphone, args.deny_mic),
        webcam: response(defaults.webcam, args.deny_webcam),
        system_audio: args.system_audio,
        chunk_mode: ChunkMode::Synthetic,
        ..defaults
    });
    let downloads = DirectoryDownloads::new(&config.download_dir);
    let handle = RecorderHandle::spawn(Arc::new(platform), Arc::new(downloads), config);
    let state = RecorderState::new(handle, settings);

    recording::start_recording(&state)
        .await
        .map_err(|e| anyhow::anyhow!(e.message))?;
    let status = state.handle.wait_until_settled().await?;
    if status.phase == RecordingPhase::Idle {
        bail!(
            "Recording did not start: {}",
            status.last_error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    println!(
        "Recording as {} for {}s...",
        status.mime_type.as_deref().unwrap_or("?"),
        args.duration_secs
    );
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.duration_secs)) => {}
        _ = tokio::signal::ctrl_c() => println!("Interrupted"),
        // The session may end on its own, e.g. when the share is revoked.
        _ = state.handle.wait_for(|s| s.phase != RecordingPhase::Recording) => {}
    }

    recording::stop_recording(&state)
        .await
        .map_err(|e| anyhow::anyhow!(e.message))?;
    let status = state.handle.wait_until_idle().await?;

    match status.last_export {
        Some(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if let Some(hint) = &summary.compatibility_hint {
                println!("{}", hint.message);
                if let Some(url) = &hint.open_url {
                    println!("Open: {}", url);
                }
            }
        }
        None => bail!(
            "No recording was produced: {}",
            status.last_error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    screen_recorder_lib::init_logging();
    let cli = Cli::parse();

    let config_path = cli.config.or_else(default_config_path);
    let config = match &config_path {
        Some(path) => load_config(path).with_context(|| format!("Loading {}", path.display()))?,
        None => RecorderConfig::default(),
    };

    match cli.command {
        Commands::Record(args) => record(config, args).await,
        Commands::Config { write } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if write {
                let path = config_path.context("No config directory on this system")?;
                save_config(&path, &config)?;
                println!("Wrote {}", path.display());
            }
            Ok(())
        }
    }
}
