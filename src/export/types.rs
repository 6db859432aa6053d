//! Export types
//!
//! The finished artifact, the summary published to callers, and export errors.

use crate::recorder::mime::{container_of, is_broadly_compatible};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One finished recording, held in memory until it is saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Shown when the container may not play everywhere.
///
/// Conversion is deliberately not offered; the user gets a link to open the
/// file in an external player instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityHint {
    pub message: String,
    /// `file://` URL of the saved recording, when it was saved
    pub open_url: Option<String>,
}

impl CompatibilityHint {
    pub fn for_artifact(artifact: &Artifact, saved_path: Option<&Path>) -> Option<Self> {
        if is_broadly_compatible(&artifact.mime_type) {
            return None;
        }
        Some(Self {
            message: format!(
                "{} recordings may not play in every video player. Open it in a player such as VLC if it does not play.",
                container_of(&artifact.mime_type)
            ),
            open_url: saved_path.map(file_url),
        })
    }
}

/// Percent-encoded `file://` URL for a local path
pub fn file_url(path: &Path) -> String {
    let encoded: Vec<String> = path
        .to_string_lossy()
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("file://{}", encoded.join("/"))
}

/// Result of a finalized session, published in the recorder status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub chunk_count: usize,
    /// Where the file was written; `None` when auto-download is off
    pub saved_path: Option<PathBuf>,
    pub compatibility_hint: Option<CompatibilityHint>,
}

impl ExportSummary {
    pub fn new(artifact: &Artifact, saved_path: Option<PathBuf>) -> Self {
        Self {
            file_name: artifact.file_name.clone(),
            mime_type: artifact.mime_type.clone(),
            size_bytes: artifact.size_bytes(),
            chunk_count: artifact.chunk_count,
            compatibility_hint: CompatibilityHint::for_artifact(artifact, saved_path.as_deref()),
            saved_path,
        }
    }
}

/// Export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Recording is empty, no data was captured")]
    EmptyRecording,

    #[error("No finished recording to save")]
    NoArtifact,

    #[error("Invalid download location: {0}")]
    InvalidTarget(String),
}
