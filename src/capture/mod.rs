//! Capture sources
//!
//! Platform capability traits, the acquisition stage, the webcam preview
//! surface, and a simulated platform.

pub mod acquirer;
pub mod constraints;
pub mod preview;
pub mod simulated;
pub mod traits;

pub use acquirer::{AcquiredSources, AcquiredStream, CaptureAcquirer};
pub use preview::{PreviewPlacement, WebcamPreview};
pub use traits::{
    AudioContext, CaptureError, MediaPlatform, MediaRecorder, MediaStream, MediaTrack, NodeId,
    RecorderOptions, SourceKind, TrackKind,
};
