//! Recording session
//!
//! A [`Session`] owns every resource of one recording: the acquired streams,
//! the mixing graph, the platform recorder and the chunk sequence. Resources
//! are released exactly once, either through [`Session::release`] or when
//! the session is dropped.

use super::composer::compose;
use super::error::{RecordingError, RecordingResult};
use super::machine::RecorderEventSink;
use super::mime::{resolve_mime_type, MimeChoice};
use super::state::{ChunkBuffer, RecordedChunk, RecordingSettings};
use crate::capture::{AcquiredSources, MediaPlatform, MediaRecorder, RecorderOptions, SourceKind, WebcamPreview};
use crate::config::RecorderConfig;
use crate::export::{finalize, Artifact, ExportError};
use crate::mixer::AudioMixer;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    settings: RecordingSettings,
    started_at: DateTime<Utc>,
    sources: AcquiredSources,
    mixer: Option<AudioMixer>,
    recorder: Option<Box<dyn MediaRecorder>>,
    /// Started and neither asked to stop nor acknowledged a stop
    recorder_active: bool,
    mime: Option<MimeChoice>,
    chunks: ChunkBuffer,
    preview: Option<Arc<WebcamPreview>>,
    /// Stops the track watchers
    watchers: CancellationToken,
    released: bool,
}

impl Session {
    pub fn new(
        id: Uuid,
        settings: RecordingSettings,
        sources: AcquiredSources,
        timeslice_ms: u64,
    ) -> Self {
        Self {
            id,
            settings,
            started_at: Utc::now(),
            sources,
            mixer: None,
            recorder: None,
            recorder_active: false,
            mime: None,
            chunks: ChunkBuffer::new(timeslice_ms),
            preview: None,
            watchers: CancellationToken::new(),
            released: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn settings(&self) -> &RecordingSettings {
        &self.settings
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn mime(&self) -> Option<&MimeChoice> {
        self.mime.as_ref()
    }

    pub fn chunks(&self) -> &ChunkBuffer {
        &self.chunks
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Show the webcam, if one was acquired, on the floating preview
    pub fn attach_preview(&mut self, preview: &Arc<WebcamPreview>) {
        if let Some(webcam) = &self.sources.webcam {
            preview.attach(webcam.stream());
            self.preview = Some(preview.clone());
        }
    }

    /// Mix, compose, negotiate the container and start the recorder.
    ///
    /// On error the caller discards the session, which releases whatever
    /// was built so far.
    pub fn start_recording(
        &mut self,
        platform: &dyn MediaPlatform,
        config: &RecorderConfig,
        sink: RecorderEventSink,
    ) -> RecordingResult<MimeChoice> {
        let mixer = AudioMixer::open(platform, &config.audio_context, self.sources.audio_inputs())?;
        let combined = compose(self.sources.display.stream(), mixer.output());
        self.mixer = Some(mixer);

        let choice = resolve_mime_type(&config.mime_preferences, &config.fallback_mime_type, |m| {
            platform.is_type_supported(m)
        });
        let quality = self.settings.recording_quality;
        let options = RecorderOptions {
            mime_type: choice.mime_type.clone(),
            video_bits_per_second: quality.video_bits_per_second(),
            audio_bits_per_second: quality.audio_bits_per_second(),
        };

        let mut recorder = platform.create_recorder(&combined, &options, sink)?;
        recorder.start(config.timeslice_ms)?;

        tracing::info!(
            "Recording session {} as {} at {} bps video / {} bps audio",
            self.id,
            choice.mime_type,
            options.video_bits_per_second,
            options.audio_bits_per_second
        );
        self.recorder = Some(recorder);
        self.recorder_active = true;
        self.mime = Some(choice.clone());
        Ok(choice)
    }

    /// Report tracks that end on the platform side through `sink`
    pub fn watch_tracks(&self, sink: &RecorderEventSink) {
        for acquired in self.sources.streams() {
            for track in acquired.stream().tracks() {
                let mut ended = track.ended();
                let sink = sink.clone();
                let cancel = self.watchers.clone();
                let source = acquired.source();
                let kind = track.kind();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        result = ended.wait_for(|ended| *ended) => {
                            if result.is_ok() {
                                sink.track_ended(source, kind);
                            }
                        }
                    }
                });
            }
        }
    }

    pub fn append(&mut self, data: Vec<u8>) -> Option<&RecordedChunk> {
        self.chunks.push(data)
    }

    pub fn set_source_gain(&mut self, source: SourceKind, gain: f32) -> RecordingResult<usize> {
        match self.mixer.as_mut() {
            Some(mixer) => Ok(mixer.set_source_gain(source, gain)?),
            None => Err(RecordingError::NotRecording),
        }
    }

    /// Ask the recorder to stop; the acknowledgment arrives as an event
    pub fn stop_recorder(&mut self) -> RecordingResult<()> {
        match self.recorder.as_mut() {
            Some(recorder) => {
                self.recorder_active = false;
                recorder.stop()
            }
            None => Err(RecordingError::NotRecording),
        }
    }

    /// Stop every acquired track, clear the preview and close the audio
    /// context. Chunks are kept for the finalizer. Calling again is a no-op.
    ///
    /// Only called once the recorder is inactive, so it is never asked to
    /// stop afterwards.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.recorder_active = false;

        self.watchers.cancel();
        self.sources.release_all();
        if let Some(preview) = self.preview.take() {
            preview.detach();
        }
        if let Some(mixer) = self.mixer.as_mut() {
            mixer.close();
        }
        tracing::info!("Released resources of session {}", self.id);
    }

    /// Build the artifact from the recorded chunks, leaving the sequence empty
    pub fn finalize(&mut self) -> Result<Artifact, ExportError> {
        let chunks = self.chunks.take();
        match &self.mime {
            Some(choice) => finalize(chunks, choice, self.started_at),
            None => Err(ExportError::EmptyRecording),
        }
    }

    /// Release everything and drop recorded data
    pub fn discard(&mut self) {
        if self.recorder_active {
            self.recorder_active = false;
            if let Some(recorder) = self.recorder.as_mut() {
                if let Err(e) = recorder.stop() {
                    tracing::warn!("Recorder of discarded session {} did not stop: {}", self.id, e);
                }
            }
        }
        self.release();
        if !self.chunks.is_empty() {
            tracing::debug!("Discarding {} chunks of session {}", self.chunks.len(), self.id);
        }
        self.chunks.clear();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.discard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::constraints::{default_webcam_constraints, AudioConstraints, DisplayConstraints};
    use crate::capture::simulated::{SimulatedDevices, SimulatedPlatform};
    use crate::capture::CaptureAcquirer;
    use crate::recorder::state::RecordingQuality;
    use tokio::sync::mpsc;

    async fn acquire(platform: &SimulatedPlatform, settings: &RecordingSettings) -> AcquiredSources {
        CaptureAcquirer::new(
            DisplayConstraints::default(),
            AudioConstraints::default(),
            default_webcam_constraints(),
        )
        .acquire(platform, settings, &CancellationToken::new())
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_recording_configures_encoder() {
        let platform = SimulatedPlatform::new(SimulatedDevices::default());
        let settings = RecordingSettings {
            enable_mic: true,
            enable_webcam: false,
            auto_download: true,
            recording_quality: RecordingQuality::Medium,
        };
        let sources = acquire(&platform, &settings).await;
        let mut session = Session::new(Uuid::new_v4(), settings, sources, 250);
        let (tx, _rx) = mpsc::unbounded_channel();

        let choice = session
            .start_recording(
                &platform,
                &RecorderConfig::default(),
                RecorderEventSink::new(session.id(), tx),
            )
            .unwrap();

        assert_eq!(choice.mime_type, "video/webm;codecs=vp9,opus");
        let probe = &platform.recorders()[0];
        assert!(probe.is_started());
        assert_eq!(probe.options.video_bits_per_second, 4_000_000);
        assert_eq!(probe.options.audio_bits_per_second, 256_000);
        // Screen video plus the mixed mic
        assert_eq!(probe.track_ids.len(), 2);
        assert_eq!(probe.audio_track_count, 1);
    }

    #[tokio::test]
    async fn test_release_once_and_preview_detached() {
        let platform = SimulatedPlatform::new(SimulatedDevices::default());
        let settings = RecordingSettings {
            enable_mic: true,
            enable_webcam: true,
            ..RecordingSettings::default()
        };
        let sources = acquire(&platform, &settings).await;
        let preview = Arc::new(WebcamPreview::default());
        let mut session = Session::new(Uuid::new_v4(), settings, sources, 250);
        let (tx, _rx) = mpsc::unbounded_channel();

        session.attach_preview(&preview);
        assert!(preview.is_attached());
        session
            .start_recording(
                &platform,
                &RecorderConfig::default(),
                RecorderEventSink::new(session.id(), tx),
            )
            .unwrap();

        session.release();
        session.release();
        drop(session);

        assert!(!preview.is_attached());
        assert_eq!(platform.tracks().len(), 3);
        assert!(platform.tracks().iter().all(|t| t.stop_count() == 1));
        assert_eq!(platform.audio_contexts()[0].close_count(), 1);
    }

    #[tokio::test]
    async fn test_finalize_clears_chunks() {
        let platform = SimulatedPlatform::new(SimulatedDevices::default());
        let settings = RecordingSettings::default();
        let sources = acquire(&platform, &settings).await;
        let mut session = Session::new(Uuid::new_v4(), settings, sources, 250);
        let (tx, _rx) = mpsc::unbounded_channel();
        session
            .start_recording(
                &platform,
                &RecorderConfig::default(),
                RecorderEventSink::new(session.id(), tx),
            )
            .unwrap();

        session.append(vec![1, 2]);
        session.append(vec![3]);
        let artifact = session.finalize().unwrap();

        assert_eq!(artifact.data, vec![1, 2, 3]);
        assert!(session.chunks().is_empty());
        // A second call has nothing to export
        assert!(matches!(session.finalize(), Err(ExportError::EmptyRecording)));
    }

    #[tokio::test]
    async fn test_eight_slices_span_1750ms() {
        let platform = SimulatedPlatform::new(SimulatedDevices::default());
        let settings = RecordingSettings::default();
        let sources = acquire(&platform, &settings).await;
        let mut session = Session::new(Uuid::new_v4(), settings, sources, 250);

        for i in 0..8u8 {
            session.append(vec![i; 32]);
        }

        let timestamps: Vec<u64> = session
            .chunks()
            .chunks()
            .iter()
            .map(|c| c.sequence_timestamp)
            .collect();
        assert_eq!(timestamps, (0..8).map(|i| i * 250).collect::<Vec<u64>>());
        assert_eq!(timestamps.last(), Some(&1750));
    }

    #[tokio::test]
    async fn test_dropping_unstarted_session_releases_sources() {
        let platform = SimulatedPlatform::new(SimulatedDevices::default());
        let settings = RecordingSettings::default();
        let sources = acquire(&platform, &settings).await;

        drop(Session::new(Uuid::new_v4(), settings, sources, 250));

        assert!(platform.tracks().iter().all(|t| t.stop_count() == 1));
    }

    #[tokio::test]
    async fn test_recorder_not_stopped_after_release() {
        let platform = SimulatedPlatform::new(SimulatedDevices::default());
        let settings = RecordingSettings::default();
        let sources = acquire(&platform, &settings).await;
        let mut session = Session::new(Uuid::new_v4(), settings, sources, 250);
        let (tx, _rx) = mpsc::unbounded_channel();
        session
            .start_recording(
                &platform,
                &RecorderConfig::default(),
                RecorderEventSink::new(session.id(), tx),
            )
            .unwrap();

        // The platform already ended the recorder
        session.release();
        drop(session);

        assert_eq!(platform.recorders()[0].stop_calls(), 0);
    }

    #[tokio::test]
    async fn test_discarding_active_session_stops_recorder_once() {
        let platform = SimulatedPlatform::new(SimulatedDevices::default());
        let settings = RecordingSettings::default();
        let sources = acquire(&platform, &settings).await;
        let mut session = Session::new(Uuid::new_v4(), settings, sources, 250);
        let (tx, _rx) = mpsc::unbounded_channel();
        session
            .start_recording(
                &platform,
                &RecorderConfig::default(),
                RecorderEventSink::new(session.id(), tx),
            )
            .unwrap();

        session.discard();
        drop(session);

        assert_eq!(platform.recorders()[0].stop_calls(), 1);
    }
}
