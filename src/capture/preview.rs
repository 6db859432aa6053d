//! Floating webcam preview surface
//!
//! The preview lives in the shared UI tree, outside the session, but the
//! stream it shows is session-owned and must be detached when the session ends.

use super::traits::MediaStream;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Corner of the main view the preview floats over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreviewCorner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Where and how large the preview is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewPlacement {
    pub corner: PreviewCorner,
    pub width: u32,
    pub height: u32,
    /// Margin from the view edges in pixels
    pub margin: u32,
}

impl Default for PreviewPlacement {
    fn default() -> Self {
        Self {
            corner: PreviewCorner::BottomRight,
            width: 240,
            height: 135,
            margin: 20,
        }
    }
}

/// Preview surface shared with the UI
#[derive(Debug, Default)]
pub struct WebcamPreview {
    placement: PreviewPlacement,
    stream: RwLock<Option<MediaStream>>,
}

impl WebcamPreview {
    pub fn new(placement: PreviewPlacement) -> Self {
        Self {
            placement,
            stream: RwLock::new(None),
        }
    }

    pub fn placement(&self) -> PreviewPlacement {
        self.placement
    }

    pub fn attach(&self, stream: &MediaStream) {
        tracing::debug!("Attaching webcam preview {}", stream.id());
        *self.stream.write() = Some(stream.clone());
    }

    /// Clear the preview. Returns whether a stream was attached.
    pub fn detach(&self) -> bool {
        let previous = self.stream.write().take();
        if let Some(stream) = &previous {
            tracing::debug!("Detached webcam preview {}", stream.id());
        }
        previous.is_some()
    }

    /// ID of the stream currently shown, if any
    pub fn current_stream_id(&self) -> Option<String> {
        self.stream.read().as_ref().map(|s| s.id().to_string())
    }

    pub fn is_attached(&self) -> bool {
        self.stream.read().is_some()
    }
}
