//! Recording-related commands

use crate::capture::SourceKind;
use crate::export::ExportSummary;
use crate::recorder::{RecorderHandle, RecorderStatus, RecordingError, RecordingSettings};
use crate::utils::{AppError, ErrorResponse};
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

pub type CommandResult<T> = Result<T, ErrorResponse>;

fn respond<T, E: Into<AppError>>(result: Result<T, E>) -> CommandResult<T> {
    result.map_err(|e| {
        let response = ErrorResponse::from(e.into());
        tracing::debug!("Command failed: {} ({})", response.message, response.code);
        response
    })
}

/// Application state for recording
#[derive(Clone)]
pub struct RecorderState {
    pub handle: RecorderHandle,
    /// Settings menu values, read when a session starts
    pub settings: Arc<RwLock<RecordingSettings>>,
}

impl RecorderState {
    pub fn new(handle: RecorderHandle, settings: RecordingSettings) -> Self {
        Self {
            handle,
            settings: Arc::new(RwLock::new(settings)),
        }
    }
}

/// Current settings menu values
pub async fn get_recording_settings(state: &RecorderState) -> CommandResult<RecordingSettings> {
    Ok(*state.settings.read())
}

/// Change the settings menu values. Refused while a session is active.
pub async fn update_recording_settings(
    state: &RecorderState,
    settings: RecordingSettings,
) -> CommandResult<RecordingSettings> {
    if state.handle.status().is_busy() {
        return respond(Err(RecordingError::SettingsLocked));
    }
    *state.settings.write() = settings;
    tracing::info!("Recording settings updated: {:?}", settings);
    Ok(settings)
}

/// Start recording with the current settings
pub async fn start_recording(state: &RecorderState) -> CommandResult<Uuid> {
    let settings = *state.settings.read();
    respond(state.handle.start(settings).await)
}

/// Stop recording. Stopping when nothing is recording is not an error.
pub async fn stop_recording(state: &RecorderState) -> CommandResult<()> {
    respond(state.handle.stop().await)
}

/// Get current recording state
pub async fn get_recording_state(state: &RecorderState) -> CommandResult<RecorderStatus> {
    Ok(state.handle.status())
}

/// Set one source's level in the live mix
pub async fn set_source_gain(
    state: &RecorderState,
    source: SourceKind,
    gain: f32,
) -> CommandResult<usize> {
    respond(state.handle.set_source_gain(source, gain).await)
}

/// Save the last recording that was not downloaded automatically
pub async fn save_last_recording(state: &RecorderState) -> CommandResult<ExportSummary> {
    respond(state.handle.save_last_recording().await)
}
