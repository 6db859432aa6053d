//! Screen recorder - multi-source capture and recording pipeline.
//!
//! Captures a display (with optional system audio), a microphone and a
//! webcam, mixes the audio sources into one track, records the combined
//! stream in timed chunks and saves the result as a single file.
//!
//! Platform media APIs sit behind [`capture::MediaPlatform`];
//! [`capture::simulated::SimulatedPlatform`] implements it in-process.

pub mod capture;
pub mod commands;
pub mod config;
pub mod export;
pub mod mixer;
pub mod recorder;
pub mod utils;

pub use config::RecorderConfig;
pub use recorder::{RecorderHandle, RecordingEvent};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screen_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting screen recorder v{}", env!("CARGO_PKG_VERSION"));
}
