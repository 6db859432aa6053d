//! Error types and handling
//!
//! Module errors folded into one application error, plus the serializable
//! form handed to callers.

use crate::capture::{CaptureError, SourceKind};
use crate::config::ConfigError;
use crate::export::ExportError;
use crate::mixer::MixerError;
use crate::recorder::RecordingError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Capture error: {0}")]
    Capture(CaptureError),

    #[error("Recording error: {0}")]
    Recording(RecordingError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Permission denied: {0}")]
    PermissionDenied(SourceKind),
}

impl From<CaptureError> for AppError {
    fn from(error: CaptureError) -> Self {
        match error {
            CaptureError::PermissionDenied(source) => AppError::PermissionDenied(source),
            other => AppError::Capture(other),
        }
    }
}

impl From<RecordingError> for AppError {
    fn from(error: RecordingError) -> Self {
        match error {
            RecordingError::Capture(capture) => capture.into(),
            other => AppError::Recording(other),
        }
    }
}

impl From<MixerError> for AppError {
    fn from(error: MixerError) -> Self {
        AppError::Recording(RecordingError::Mixer(error))
    }
}

/// Error response for callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Capture(_) => "CAPTURE_ERROR",
            AppError::Recording(RecordingError::AlreadyRecording) => "ALREADY_RECORDING",
            AppError::Recording(RecordingError::NotRecording) => "NOT_RECORDING",
            AppError::Recording(RecordingError::SettingsLocked) => "SETTINGS_LOCKED",
            AppError::Recording(_) => "RECORDING_ERROR",
            AppError::Export(ExportError::NoArtifact) => "NO_RECORDING",
            AppError::Export(_) => "EXPORT_ERROR",
            AppError::PermissionDenied(_) => "PERMISSION_DENIED",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
