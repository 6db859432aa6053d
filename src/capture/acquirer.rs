//! Capture acquisition
//!
//! Requests the display, then the optional microphone and webcam, in that
//! order. Only the display is mandatory. Every stream acquired during an
//! attempt is owned by an [`AcquiredStream`], so an aborted or cancelled
//! attempt releases whatever it already holds.

use super::constraints::{AudioConstraints, DisplayConstraints, UserMediaConstraints, VideoConstraints};
use super::traits::{CaptureError, MediaPlatform, MediaStream, MediaTrack, SourceKind};
use crate::recorder::state::RecordingSettings;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Ownership record for one acquired stream.
///
/// Releasing stops every track once; dropping an unreleased stream releases it.
#[derive(Debug)]
pub struct AcquiredStream {
    source: SourceKind,
    stream: MediaStream,
    released: bool,
}

impl AcquiredStream {
    pub fn new(source: SourceKind, stream: MediaStream) -> Self {
        Self {
            source,
            stream,
            released: false,
        }
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Stop all tracks. Calling again is a no-op.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        for track in self.stream.tracks() {
            track.stop();
        }
        tracing::debug!(
            "Released {} stream {} ({} tracks)",
            self.source,
            self.stream.id(),
            self.stream.tracks().len()
        );
    }
}

impl Drop for AcquiredStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Everything one successful acquisition produced
#[derive(Debug)]
pub struct AcquiredSources {
    pub display: AcquiredStream,
    pub mic: Option<AcquiredStream>,
    pub webcam: Option<AcquiredStream>,
}

impl AcquiredSources {
    /// All owned streams, display first
    pub fn streams(&self) -> impl Iterator<Item = &AcquiredStream> {
        std::iter::once(&self.display)
            .chain(self.mic.iter())
            .chain(self.webcam.iter())
    }

    /// Live audio tracks to feed the mixer, tagged with their source.
    ///
    /// Webcam audio is never requested, so only the mic and the display's
    /// system audio contribute.
    pub fn audio_inputs(&self) -> Vec<(SourceKind, Arc<dyn MediaTrack>)> {
        let mut inputs = Vec::new();
        for acquired in self.mic.iter().chain(std::iter::once(&self.display)) {
            for track in acquired.stream().audio_tracks() {
                if track.is_live() {
                    inputs.push((acquired.source(), track.clone()));
                }
            }
        }
        inputs
    }

    pub fn release_all(&mut self) {
        self.display.release();
        if let Some(mic) = self.mic.as_mut() {
            mic.release();
        }
        if let Some(webcam) = self.webcam.as_mut() {
            webcam.release();
        }
    }
}

/// Requests capture sources from the platform
#[derive(Debug, Clone)]
pub struct CaptureAcquirer {
    display: DisplayConstraints,
    microphone: AudioConstraints,
    webcam: VideoConstraints,
}

impl CaptureAcquirer {
    pub fn new(
        display: DisplayConstraints,
        microphone: AudioConstraints,
        webcam: VideoConstraints,
    ) -> Self {
        Self {
            display,
            microphone,
            webcam,
        }
    }

    /// Acquire all sources requested by `settings`.
    ///
    /// Display failure is returned as an error. Mic and webcam failures are
    /// logged and the source is omitted. If `cancel` fires, any pending
    /// request is abandoned and already acquired streams are released.
    pub async fn acquire(
        &self,
        platform: &dyn MediaPlatform,
        settings: &RecordingSettings,
        cancel: &CancellationToken,
    ) -> Result<AcquiredSources, CaptureError> {
        tracing::info!("Requesting display capture");
        let display_stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CaptureError::Cancelled),
            result = platform.get_display_media(&self.display) => result,
        };

        let mut display = match display_stream {
            Ok(stream) => AcquiredStream::new(SourceKind::Display, stream),
            Err(e) => {
                tracing::error!("Display capture failed: {}", e);
                return Err(e);
            }
        };

        if display.stream().video_tracks().next().is_none() {
            tracing::error!("Display capture returned no video track");
            display.release();
            return Err(CaptureError::NotFound(SourceKind::Display));
        }

        // From here on, returning early drops `display` and releases it.
        let mic = if settings.enable_mic {
            self.request_optional(
                platform,
                SourceKind::Mic,
                UserMediaConstraints::microphone(self.microphone),
                cancel,
            )
            .await?
        } else {
            None
        };

        let webcam = if settings.enable_webcam {
            self.request_optional(
                platform,
                SourceKind::Webcam,
                UserMediaConstraints::camera(self.webcam),
                cancel,
            )
            .await?
        } else {
            None
        };

        let display_tracks = display.stream().tracks().len();
        tracing::info!(
            "Capture acquired: display={} mic={} webcam={}",
            display_tracks,
            mic.is_some(),
            webcam.is_some()
        );

        Ok(AcquiredSources {
            display,
            mic,
            webcam,
        })
    }

    /// Request a non-essential source. Only cancellation is an error.
    async fn request_optional(
        &self,
        platform: &dyn MediaPlatform,
        source: SourceKind,
        constraints: UserMediaConstraints,
        cancel: &CancellationToken,
    ) -> Result<Option<AcquiredStream>, CaptureError> {
        tracing::info!("Requesting {} capture", source);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Capture cancelled while waiting for {}", source);
                return Err(CaptureError::Cancelled);
            }
            result = platform.get_user_media(&constraints) => result,
        };

        match result {
            Ok(stream) => Ok(Some(AcquiredStream::new(source, stream))),
            Err(e) => {
                tracing::warn!("{} capture unavailable, continuing without it: {}", source, e);
                Ok(None)
            }
        }
    }
}
