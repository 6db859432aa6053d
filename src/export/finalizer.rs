//! Finalization
//!
//! Concatenates a session's chunks, in emission order, into one artifact.

use super::types::{Artifact, ExportError};
use crate::recorder::mime::MimeChoice;
use crate::recorder::state::RecordedChunk;
use chrono::{DateTime, SecondsFormat, Utc};

/// Artifact file name for a session started at `started_at`.
///
/// `screen-recording-2024-05-01T09-30-12-345Z.webm`: the ISO 8601 timestamp
/// with every `:` and `.` replaced, so the only `.` left is the extension's.
pub fn recording_file_name(started_at: DateTime<Utc>, extension: &str) -> String {
    let timestamp = started_at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(|c: char| c == ':' || c == '.', "-");
    format!("screen-recording-{timestamp}.{extension}")
}

/// Build the artifact from `chunks`. An empty sequence is an error.
pub fn finalize(
    chunks: Vec<RecordedChunk>,
    choice: &MimeChoice,
    started_at: DateTime<Utc>,
) -> Result<Artifact, ExportError> {
    if chunks.is_empty() {
        tracing::error!("Finalizer called with no recorded chunks");
        return Err(ExportError::EmptyRecording);
    }

    let total: usize = chunks.iter().map(|c| c.data.len()).sum();
    let mut data = Vec::with_capacity(total);
    for chunk in &chunks {
        data.extend_from_slice(&chunk.data);
    }

    let artifact = Artifact {
        file_name: recording_file_name(started_at, choice.extension()),
        mime_type: choice.mime_type.clone(),
        data,
        chunk_count: chunks.len(),
        created_at: Utc::now(),
    };

    tracing::info!(
        "Finalized {} ({} chunks, {} bytes)",
        artifact.file_name,
        artifact.chunk_count,
        artifact.size_bytes()
    );
    Ok(artifact)
}
