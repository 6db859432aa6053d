//! Capture constraint presets
//!
//! Requested (ideal) formats for each capture source. Platforms may deliver
//! something different; nothing downstream depends on the exact values.

use serde::{Deserialize, Serialize};

/// Requested video format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub ideal_frame_rate: u32,
}

/// Requested microphone processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub sample_rate: u32,
    pub channel_count: u16,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            sample_rate: 48_000,
            channel_count: 2,
        }
    }
}

/// Display capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayConstraints {
    pub video: VideoConstraints,
    /// Ask for system audio along with the display; platforms may ignore it
    pub system_audio: bool,
}

impl Default for DisplayConstraints {
    fn default() -> Self {
        Self {
            video: VideoConstraints {
                ideal_width: 1920,
                ideal_height: 1080,
                ideal_frame_rate: 30,
            },
            system_audio: true,
        }
    }
}

/// Microphone or camera request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMediaConstraints {
    pub audio: Option<AudioConstraints>,
    pub video: Option<VideoConstraints>,
}

impl UserMediaConstraints {
    pub fn microphone(audio: AudioConstraints) -> Self {
        Self {
            audio: Some(audio),
            video: None,
        }
    }

    pub fn camera(video: VideoConstraints) -> Self {
        Self {
            audio: None,
            video: Some(video),
        }
    }
}

/// Default webcam request: 1280x720 @ 30fps
pub fn default_webcam_constraints() -> VideoConstraints {
    VideoConstraints {
        ideal_width: 1280,
        ideal_height: 720,
        ideal_frame_rate: 30,
    }
}

/// Latency hint for the mixing context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyHint {
    Interactive,
    Balanced,
    Playback,
}

/// Audio context construction options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioContextOptions {
    pub sample_rate: u32,
    pub latency_hint: LatencyHint,
}

impl Default for AudioContextOptions {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            latency_hint: LatencyHint::Interactive,
        }
    }
}
