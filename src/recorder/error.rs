//! Recording errors

use crate::capture::CaptureError;
use crate::mixer::MixerError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    #[error("A recording session is already active")]
    AlreadyRecording,

    #[error("No recording in progress")]
    NotRecording,

    #[error("Recording settings cannot change while a session is active")]
    SettingsLocked,

    #[error("Capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Mixing failed: {0}")]
    Mixer(#[from] MixerError),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Recorder task is no longer running")]
    RecorderGone,
}

pub type RecordingResult<T> = Result<T, RecordingError>;
