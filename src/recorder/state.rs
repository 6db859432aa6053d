//! Recording state
//!
//! Settings, the caller-visible phase and status snapshot, and the ordered
//! chunk buffer of one session.

use crate::export::ExportSummary;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Encoding quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingQuality {
    #[default]
    High,
    Medium,
    Low,
}

impl RecordingQuality {
    /// Target video bitrate in bits per second
    pub fn video_bits_per_second(&self) -> u32 {
        match self {
            RecordingQuality::High => 8_000_000,
            RecordingQuality::Medium => 4_000_000,
            RecordingQuality::Low => 2_000_000,
        }
    }

    /// Target audio bitrate; the same for every preset
    pub fn audio_bits_per_second(&self) -> u32 {
        256_000
    }
}

/// User-facing recording options, read once when a session starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingSettings {
    pub enable_mic: bool,
    pub enable_webcam: bool,
    pub auto_download: bool,
    pub recording_quality: RecordingQuality,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            enable_mic: true,
            enable_webcam: false,
            auto_download: true,
            recording_quality: RecordingQuality::High,
        }
    }
}

/// Phase of the recorder as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingPhase {
    #[default]
    Idle,
    Requesting,
    Recording,
    Stopping,
}

/// Snapshot published after every transition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStatus {
    pub phase: RecordingPhase,
    pub session_id: Option<Uuid>,
    /// Negotiated container of the active session
    pub mime_type: Option<String>,
    pub chunk_count: usize,
    pub recorded_bytes: u64,
    pub last_export: Option<ExportSummary>,
    pub last_error: Option<String>,
}

impl RecorderStatus {
    /// True from the moment the recorder starts until finalization completes
    pub fn is_recording(&self) -> bool {
        matches!(self.phase, RecordingPhase::Recording | RecordingPhase::Stopping)
    }

    /// True whenever a session exists; start is disabled and settings locked
    pub fn is_busy(&self) -> bool {
        self.phase != RecordingPhase::Idle
    }
}

/// One slice of encoded data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedChunk {
    pub data: Vec<u8>,
    /// Logical position in timeslice units, starting at 0
    pub sequence_timestamp: u64,
}

/// Ordered chunk sequence of one session
#[derive(Debug)]
pub struct ChunkBuffer {
    timeslice_ms: u64,
    chunks: Vec<RecordedChunk>,
    next_timestamp: u64,
    total_bytes: u64,
}

impl ChunkBuffer {
    /// A zero timeslice is raised to 1ms so timestamps keep increasing
    pub fn new(timeslice_ms: u64) -> Self {
        Self {
            timeslice_ms: timeslice_ms.max(1),
            chunks: Vec::new(),
            next_timestamp: 0,
            total_bytes: 0,
        }
    }

    /// Append a slice. Empty slices are dropped and return `None`.
    pub fn push(&mut self, data: Vec<u8>) -> Option<&RecordedChunk> {
        if data.is_empty() {
            return None;
        }

        let sequence_timestamp = self.next_timestamp;
        self.next_timestamp += self.timeslice_ms;
        self.total_bytes += data.len() as u64;
        self.chunks.push(RecordedChunk {
            data,
            sequence_timestamp,
        });
        self.chunks.last()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn chunks(&self) -> &[RecordedChunk] {
        &self.chunks
    }

    /// Take every chunk out, leaving the buffer empty
    pub fn take(&mut self) -> Vec<RecordedChunk> {
        self.total_bytes = 0;
        std::mem::take(&mut self.chunks)
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_bytes = 0;
    }
}
