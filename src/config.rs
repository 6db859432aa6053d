//! Recorder configuration
//!
//! Loaded from a JSON file. Every field has a default, so a partial file
//! (or no file at all) yields a working configuration.

use crate::capture::constraints::{
    default_webcam_constraints, AudioConstraints, AudioContextOptions, DisplayConstraints,
    VideoConstraints,
};
use crate::capture::{CaptureAcquirer, PreviewPlacement};
use crate::recorder::mime::{default_mime_preferences, DEFAULT_FALLBACK_MIME};
use crate::recorder::state::RecordingSettings;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "recorder.json";

/// Recorder chunk interval
pub const DEFAULT_TIMESLICE_MS: u64 = 250;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecorderConfig {
    /// Settings used until the user changes them from the menu
    pub settings: RecordingSettings,

    /// Where finished recordings are saved
    pub download_dir: PathBuf,

    pub timeslice_ms: u64,

    /// Containers to try, most preferred first
    pub mime_preferences: Vec<String>,

    /// Used when the encoder supports none of the preferences
    pub fallback_mime_type: String,

    pub audio_context: AudioContextOptions,
    pub display: DisplayConstraints,
    pub microphone: AudioConstraints,
    pub webcam: VideoConstraints,
    pub preview: PreviewPlacement,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            settings: RecordingSettings::default(),
            download_dir: default_download_dir(),
            timeslice_ms: DEFAULT_TIMESLICE_MS,
            mime_preferences: default_mime_preferences(),
            fallback_mime_type: DEFAULT_FALLBACK_MIME.to_string(),
            audio_context: AudioContextOptions::default(),
            display: DisplayConstraints::default(),
            microphone: AudioConstraints::default(),
            webcam: default_webcam_constraints(),
            preview: PreviewPlacement::default(),
        }
    }
}

impl RecorderConfig {
    pub fn acquirer(&self) -> CaptureAcquirer {
        CaptureAcquirer::new(self.display, self.microphone, self.webcam)
    }

    /// Reject values the recorder cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeslice_ms == 0 {
            return Err(ConfigError::ZeroTimeslice);
        }
        if self.fallback_mime_type.trim().is_empty() {
            return Err(ConfigError::EmptyFallbackMime);
        }
        Ok(())
    }
}

/// The user's download folder, or the working directory if there is none
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// `<config dir>/screen-recorder/recorder.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("screen-recorder").join(CONFIG_FILE_NAME))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("Serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("timesliceMs must be greater than zero")]
    ZeroTimeslice,

    #[error("fallbackMimeType must not be empty")]
    EmptyFallbackMime,
}

/// Load the configuration at `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<RecorderConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(RecorderConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let config: RecorderConfig =
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config.validate()?;
    Ok(config)
}

/// Write the configuration to `path` atomically
pub fn save_config(path: &Path, config: &RecorderConfig) -> Result<(), ConfigError> {
    config.validate()?;

    let write_err = |source: io::Error| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let contents = serde_json::to_string_pretty(config)?;

    // Temp file in the same directory, then rename over the target.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, contents).map_err(write_err)?;

    // Windows refuses to rename onto an existing file.
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != io::ErrorKind::NotFound {
                return Err(write_err(e));
            }
        }
    }

    std::fs::rename(&tmp_path, path).map_err(write_err)?;
    tracing::info!("Saved config to {:?}", path);
    Ok(())
}
