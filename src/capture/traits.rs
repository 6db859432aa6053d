//! Capture trait definitions
//!
//! Platform-agnostic traits for the media capabilities the recorder consumes:
//! stream acquisition, audio graph construction, and encoding.

use super::constraints::{AudioContextOptions, DisplayConstraints, UserMediaConstraints};
use crate::mixer::MixerError;
use crate::recorder::machine::RecorderEventSink;
use crate::recorder::RecordingError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Kind of data carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Which capture request produced a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Display,
    Mic,
    Webcam,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Display => write!(f, "display"),
            SourceKind::Mic => write!(f, "mic"),
            SourceKind::Webcam => write!(f, "webcam"),
        }
    }
}

/// Capture errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Permission denied for {0}")]
    PermissionDenied(SourceKind),

    #[error("No {0} source available")]
    NotFound(SourceKind),

    #[error("Capture request cancelled")]
    Cancelled,

    #[error("Platform error: {0}")]
    Platform(String),
}

/// One audio or video channel within a stream.
///
/// Implementations must make `stop` safe to call more than once; callers
/// in this crate guarantee they only call it once per acquisition.
pub trait MediaTrack: Send + Sync + fmt::Debug {
    /// Platform track ID
    fn id(&self) -> &str;

    fn kind(&self) -> TrackKind;

    /// Human readable device label
    fn label(&self) -> &str;

    /// Whether the track is still producing data
    fn is_live(&self) -> bool;

    /// Stop the track and release the underlying device
    fn stop(&self);

    /// Watch that flips to `true` once the track has ended, whether it was
    /// stopped locally or ended by the platform (e.g. share revoked).
    fn ended(&self) -> watch::Receiver<bool>;
}

/// A set of tracks handed out by one capture request.
///
/// Cloning a stream clones track references, never the tracks themselves.
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    /// An empty stream with a fresh ID
    pub fn empty() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), Vec::new())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &Arc<dyn MediaTrack>> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &Arc<dyn MediaTrack>> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    pub fn add_track(&mut self, track: Arc<dyn MediaTrack>) {
        self.tracks.push(track);
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Handle to a node inside an audio context graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Audio processing graph provided by the platform
pub trait AudioContext: Send + fmt::Debug {
    fn sample_rate(&self) -> u32;

    /// Create a source node fed by a live audio track
    fn create_track_source(&mut self, track: Arc<dyn MediaTrack>) -> Result<NodeId, MixerError>;

    fn create_gain(&mut self, gain: f32) -> Result<NodeId, MixerError>;

    fn set_gain(&mut self, node: NodeId, gain: f32) -> Result<(), MixerError>;

    /// Create the destination node whose output is exposed as a stream
    fn create_stream_destination(&mut self) -> Result<(NodeId, MediaStream), MixerError>;

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), MixerError>;

    /// Tear down the graph; all nodes become invalid
    fn close(&mut self);
}

/// Encoder options handed to the platform recorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderOptions {
    pub mime_type: String,
    pub video_bits_per_second: u32,
    pub audio_bits_per_second: u32,
}

/// Platform encoder that slices its output into chunks.
///
/// Data and stop acknowledgments are delivered asynchronously through the
/// [`RecorderEventSink`] given at construction.
pub trait MediaRecorder: Send + fmt::Debug {
    /// Negotiated media type
    fn mime_type(&self) -> &str;

    /// Begin encoding, emitting one chunk per `timeslice_ms`
    fn start(&mut self, timeslice_ms: u64) -> Result<(), RecordingError>;

    /// Request stop; the final chunk (if any) and the stop acknowledgment
    /// follow through the event sink
    fn stop(&mut self) -> Result<(), RecordingError>;
}

/// Capability provider for capture, mixing and encoding
#[async_trait]
pub trait MediaPlatform: Send + Sync {
    /// Ask the user to pick a display. May pend indefinitely on a prompt.
    async fn get_display_media(
        &self,
        constraints: &DisplayConstraints,
    ) -> Result<MediaStream, CaptureError>;

    /// Request a microphone or camera
    async fn get_user_media(
        &self,
        constraints: &UserMediaConstraints,
    ) -> Result<MediaStream, CaptureError>;

    fn create_audio_context(
        &self,
        options: &AudioContextOptions,
    ) -> Result<Box<dyn AudioContext>, MixerError>;

    /// Whether the encoder can produce the given media type
    fn is_type_supported(&self, mime_type: &str) -> bool;

    fn create_recorder(
        &self,
        stream: &MediaStream,
        options: &RecorderOptions,
        events: RecorderEventSink,
    ) -> Result<Box<dyn MediaRecorder>, RecordingError>;
}
