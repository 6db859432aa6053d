//! Recording coordinator
//!
//! A single actor task owns the state machine and the active [`Session`].
//! User commands arrive through a [`RecorderHandle`]; platform callbacks
//! arrive as [`Event`]s on the actor's event channel. Both are applied one
//! at a time, so the state is never written from two places.

use super::error::{RecordingError, RecordingResult};
use super::machine::{reduce, Effect, Event, RecorderEventSink, State};
use super::session::Session;
use super::state::{RecorderStatus, RecordingPhase, RecordingSettings};
use crate::capture::{AcquiredSources, CaptureAcquirer, CaptureError, MediaPlatform, SourceKind, WebcamPreview};
use crate::config::RecorderConfig;
use crate::export::{Artifact, DownloadTarget, ExportError, ExportSummary};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Events emitted during recording
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// Phase changed
    StateChanged(RecordingPhase),
    /// Recorder is producing data
    Started { session_id: Uuid, mime_type: String },
    /// Session ended and its resources were released
    Stopped { session_id: Uuid },
    /// Artifact finalized (and saved, when auto-download is on)
    Exported(ExportSummary),
    /// Error occurred
    Error(String),
}

enum Command {
    Start {
        settings: RecordingSettings,
        reply: oneshot::Sender<RecordingResult<Uuid>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    SetSourceGain {
        source: SourceKind,
        gain: f32,
        reply: oneshot::Sender<RecordingResult<usize>>,
    },
    SaveLastRecording {
        reply: oneshot::Sender<Result<ExportSummary, ExportError>>,
    },
    TakeLastRecording {
        reply: oneshot::Sender<Option<Artifact>>,
    },
}

/// Cloneable handle to the coordinator actor.
///
/// The actor shuts down, releasing any active session, once every handle
/// has been dropped.
#[derive(Clone)]
pub struct RecorderHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<RecorderStatus>,
    events: broadcast::Sender<RecordingEvent>,
    preview: Arc<WebcamPreview>,
}

impl RecorderHandle {
    /// Spawn the coordinator on the current tokio runtime
    pub fn spawn(
        platform: Arc<dyn MediaPlatform>,
        downloads: Arc<dyn DownloadTarget>,
        config: RecorderConfig,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(RecorderStatus::default());
        let (broadcast_tx, _) = broadcast::channel(100);
        let preview = Arc::new(WebcamPreview::new(config.preview));

        let coordinator = RecordingCoordinator {
            acquirer: config.acquirer(),
            platform,
            downloads,
            config,
            preview: preview.clone(),
            state: State::Idle,
            session: None,
            pending_capture: None,
            last_artifact: None,
            last_export: None,
            last_error: None,
            event_tx,
            status_tx,
            broadcast_tx: broadcast_tx.clone(),
        };
        tokio::spawn(coordinator.run(command_rx, event_rx));

        Self {
            commands: command_tx,
            status: status_rx,
            events: broadcast_tx,
            preview,
        }
    }

    fn send(&self, command: Command) -> RecordingResult<()> {
        self.commands
            .send(command)
            .map_err(|_| RecordingError::RecorderGone)
    }

    /// Begin a session. Returns once acquisition has started; the status
    /// moves to `Recording` (or back to `Idle`) when the platform answers.
    pub async fn start(&self, settings: RecordingSettings) -> RecordingResult<Uuid> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { settings, reply })?;
        rx.await.map_err(|_| RecordingError::RecorderGone)?
    }

    /// Request a stop. A no-op while idle or already stopping.
    pub async fn stop(&self) -> RecordingResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply })?;
        rx.await.map_err(|_| RecordingError::RecorderGone)
    }

    /// Stop and wait for the session to be finalized
    pub async fn stop_and_wait(&self) -> RecordingResult<RecorderStatus> {
        self.stop().await?;
        self.wait_until_idle().await
    }

    /// Current status snapshot
    pub fn status(&self) -> RecorderStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.events.subscribe()
    }

    /// Wait until the status satisfies `predicate`
    pub async fn wait_for<F>(&self, predicate: F) -> RecordingResult<RecorderStatus>
    where
        F: FnMut(&RecorderStatus) -> bool,
    {
        let mut rx = self.status.clone();
        let status = rx
            .wait_for(predicate)
            .await
            .map_err(|_| RecordingError::RecorderGone)?;
        Ok(status.clone())
    }

    pub async fn wait_until_idle(&self) -> RecordingResult<RecorderStatus> {
        self.wait_for(|s| s.phase == RecordingPhase::Idle).await
    }

    /// Wait until acquisition has either produced a recording or failed
    pub async fn wait_until_settled(&self) -> RecordingResult<RecorderStatus> {
        self.wait_for(|s| s.phase != RecordingPhase::Requesting).await
    }

    /// Change one source's level in the active mix
    pub async fn set_source_gain(&self, source: SourceKind, gain: f32) -> RecordingResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SetSourceGain {
            source,
            gain,
            reply,
        })?;
        rx.await.map_err(|_| RecordingError::RecorderGone)?
    }

    /// Save the artifact kept back because auto-download was off (or failed)
    pub async fn save_last_recording(&self) -> Result<ExportSummary, crate::utils::AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SaveLastRecording { reply })?;
        let result = rx.await.map_err(|_| RecordingError::RecorderGone)?;
        Ok(result?)
    }

    /// Remove and return the kept-back artifact
    pub async fn take_last_recording(&self) -> RecordingResult<Option<Artifact>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::TakeLastRecording { reply })?;
        rx.await.map_err(|_| RecordingError::RecorderGone)
    }

    /// Floating webcam preview surface
    pub fn preview(&self) -> Arc<WebcamPreview> {
        self.preview.clone()
    }
}

/// Owns the state machine and the active session
struct RecordingCoordinator {
    platform: Arc<dyn MediaPlatform>,
    downloads: Arc<dyn DownloadTarget>,
    config: RecorderConfig,
    acquirer: CaptureAcquirer,
    preview: Arc<WebcamPreview>,

    state: State,
    session: Option<Session>,
    /// Acquisition in flight and the token that abandons it
    pending_capture: Option<(Uuid, CancellationToken)>,

    /// Finished recording that was not saved
    last_artifact: Option<Artifact>,
    last_export: Option<ExportSummary>,
    last_error: Option<String>,

    event_tx: mpsc::UnboundedSender<Event>,
    status_tx: watch::Sender<RecorderStatus>,
    broadcast_tx: broadcast::Sender<RecordingEvent>,
}

impl RecordingCoordinator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        tracing::debug!("Recording coordinator started");
        loop {
            tokio::select! {
                biased;
                // `self` holds a sender, so the event channel never closes.
                Some(event) = events.recv() => self.dispatch(event),
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }
        self.shutdown();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { settings, reply } => {
                if self.state != State::Idle {
                    let _ = reply.send(Err(RecordingError::AlreadyRecording));
                    return;
                }
                self.last_error = None;
                self.last_export = None;
                self.dispatch(Event::StartRequested { settings });
                let result = self
                    .state
                    .session_id()
                    .ok_or(RecordingError::AlreadyRecording);
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                self.dispatch(Event::StopRequested);
                let _ = reply.send(());
            }
            Command::SetSourceGain {
                source,
                gain,
                reply,
            } => {
                let result = match (&self.state, self.session.as_mut()) {
                    (State::Recording { .. }, Some(session)) => session.set_source_gain(source, gain),
                    _ => Err(RecordingError::NotRecording),
                };
                let _ = reply.send(result);
            }
            Command::SaveLastRecording { reply } => {
                let _ = reply.send(self.save_last_recording());
            }
            Command::TakeLastRecording { reply } => {
                let _ = reply.send(self.last_artifact.take());
            }
        }
    }

    /// Apply `event` and every event its effects produce, in order
    fn dispatch(&mut self, event: Event) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let previous = self.state.clone();
            let (next, effects) = reduce(&self.state, event);
            self.state = next;

            // Subscribers hear about the transition before the status
            // snapshot reflects it.
            if previous.phase() != self.state.phase() {
                self.announce_transition(&previous);
            }

            for effect in effects {
                self.apply(effect, &mut queue);
            }
        }
    }

    fn announce_transition(&self, previous: &State) {
        let phase = self.state.phase();
        tracing::info!("Recorder {:?} -> {:?}", previous.phase(), phase);
        self.broadcast(RecordingEvent::StateChanged(phase));

        match (&self.state, previous) {
            (State::Recording { session_id, mime_type }, _) => {
                self.broadcast(RecordingEvent::Started {
                    session_id: *session_id,
                    mime_type: mime_type.clone(),
                });
            }
            (State::Idle, State::Stopping { session_id, .. }) => {
                self.broadcast(RecordingEvent::Stopped {
                    session_id: *session_id,
                });
            }
            _ => {}
        }
    }

    fn apply(&mut self, effect: Effect, queue: &mut VecDeque<Event>) {
        match effect {
            Effect::AcquireCapture { id, settings } => self.acquire(id, settings),
            Effect::CancelCapture { id } => {
                if let Some((pending, token)) = self.pending_capture.take() {
                    if pending == id {
                        tracing::info!("Cancelling capture request for session {}", id);
                        token.cancel();
                    } else {
                        self.pending_capture = Some((pending, token));
                    }
                }
            }
            Effect::AdoptCapture {
                id,
                settings,
                sources,
            } => {
                self.pending_capture = None;
                let mut session = Session::new(id, settings, sources, self.config.timeslice_ms);
                session.attach_preview(&self.preview);
                self.session = Some(session);
            }
            Effect::DiscardCapture { sources } => discard_sources(sources),
            Effect::StartRecorder { id } => {
                // Field borrow, the platform and config are read alongside.
                let Some(session) = self.session.as_mut().filter(|s| s.id() == id) else {
                    tracing::warn!("No session {} to start", id);
                    return;
                };
                let sink = RecorderEventSink::new(id, self.event_tx.clone());
                let result = session.start_recording(self.platform.as_ref(), &self.config, sink.clone());
                match result {
                    Ok(choice) => {
                        session.watch_tracks(&sink);
                        queue.push_back(Event::RecorderStarted {
                            id,
                            mime_type: choice.mime_type,
                        });
                    }
                    Err(error) => queue.push_back(Event::RecorderFailed { id, error }),
                }
            }
            Effect::AppendChunk { id, data } => {
                if let Some(session) = self.session_mut(id) {
                    if let Some(chunk) = session.append(data) {
                        tracing::debug!(
                            "Chunk at {}ms ({} bytes)",
                            chunk.sequence_timestamp,
                            chunk.data.len()
                        );
                    }
                }
            }
            Effect::StopRecorder { id } => {
                if let Some(session) = self.session_mut(id) {
                    if let Err(error) = session.stop_recorder() {
                        tracing::error!("Failed to stop recorder: {}", error);
                        queue.push_back(Event::RecorderFailed { id, error });
                    }
                }
            }
            Effect::ReleaseSession { id } => {
                if let Some(session) = self.session_mut(id) {
                    session.release();
                }
            }
            Effect::Finalize { id } => {
                self.finalize(id);
                queue.push_back(Event::Finalized { id });
            }
            Effect::DiscardSession { id } => {
                if let Some((pending, token)) = &self.pending_capture {
                    if *pending == id {
                        token.cancel();
                        self.pending_capture = None;
                    }
                }
                if self.session.as_ref().is_some_and(|s| s.id() == id) {
                    if let Some(mut session) = self.session.take() {
                        session.discard();
                    }
                }
            }
            Effect::ReportError { message } => {
                tracing::error!("Recording error: {}", message);
                self.broadcast(RecordingEvent::Error(message.clone()));
                self.last_error = Some(message);
            }
            Effect::EmitStatus => self.publish_status(),
        }
    }

    fn session_mut(&mut self, id: Uuid) -> Option<&mut Session> {
        self.session.as_mut().filter(|s| s.id() == id)
    }

    /// Run acquisition in its own task so a pending prompt does not block
    /// stop requests
    fn acquire(&mut self, id: Uuid, settings: RecordingSettings) {
        let token = CancellationToken::new();
        self.pending_capture = Some((id, token.clone()));

        let platform = self.platform.clone();
        let acquirer = self.acquirer.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let event = match acquirer.acquire(platform.as_ref(), &settings, &token).await {
                Ok(sources) => Event::CaptureReady { id, sources },
                Err(CaptureError::Cancelled) => {
                    tracing::debug!("Capture request for session {} abandoned", id);
                    return;
                }
                Err(error) => Event::CaptureFailed { id, error },
            };
            // If the actor is gone the sources are dropped, which releases them.
            let _ = tx.send(event);
        });
    }

    fn finalize(&mut self, id: Uuid) {
        if !self.session.as_ref().is_some_and(|s| s.id() == id) {
            tracing::warn!("No session {} to finalize", id);
            return;
        }
        let Some(mut session) = self.session.take() else {
            return;
        };
        let auto_download = session.settings().auto_download;
        let result = session.finalize();
        drop(session);

        let artifact = match result {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::error!("Finalization failed: {}", e);
                self.last_error = Some(e.to_string());
                self.broadcast(RecordingEvent::Error(e.to_string()));
                return;
            }
        };

        let summary = if auto_download {
            match self.downloads.save(&artifact) {
                Ok(path) => ExportSummary::new(&artifact, Some(path)),
                Err(e) => {
                    tracing::error!("Failed to save {}: {}", artifact.file_name, e);
                    self.last_error = Some(e.to_string());
                    self.broadcast(RecordingEvent::Error(e.to_string()));
                    let summary = ExportSummary::new(&artifact, None);
                    self.keep_last_artifact(artifact);
                    summary
                }
            }
        } else {
            tracing::info!("Auto-download off, keeping {}", artifact.file_name);
            let summary = ExportSummary::new(&artifact, None);
            self.keep_last_artifact(artifact);
            summary
        };

        if let Some(hint) = &summary.compatibility_hint {
            tracing::info!("{}", hint.message);
        }
        self.broadcast(RecordingEvent::Exported(summary.clone()));
        self.last_export = Some(summary);
    }

    fn keep_last_artifact(&mut self, artifact: Artifact) {
        if let Some(previous) = self.last_artifact.replace(artifact) {
            tracing::warn!(
                "Replacing unsaved recording {} ({} bytes)",
                previous.file_name,
                previous.data.len()
            );
        }
    }

    fn save_last_recording(&mut self) -> Result<ExportSummary, ExportError> {
        let artifact = self.last_artifact.as_ref().ok_or(ExportError::NoArtifact)?;
        let path = self.downloads.save(artifact)?;
        let summary = ExportSummary::new(artifact, Some(path));

        self.last_artifact = None;
        self.last_export = Some(summary.clone());
        self.publish_status();
        Ok(summary)
    }

    fn publish_status(&self) {
        let session = self.session.as_ref().filter(|s| Some(s.id()) == self.state.session_id());
        let status = RecorderStatus {
            phase: self.state.phase(),
            session_id: self.state.session_id(),
            mime_type: match &self.state {
                State::Recording { mime_type, .. } => Some(mime_type.clone()),
                _ => session.and_then(|s| s.mime()).map(|m| m.mime_type.clone()),
            },
            chunk_count: session.map_or(0, |s| s.chunks().len()),
            recorded_bytes: session.map_or(0, |s| s.chunks().total_bytes()),
            last_export: self.last_export.clone(),
            last_error: self.last_error.clone(),
        };
        self.status_tx.send_replace(status);
    }

    fn broadcast(&self, event: RecordingEvent) {
        // No subscribers is fine.
        let _ = self.broadcast_tx.send(event);
    }

    fn shutdown(&mut self) {
        tracing::debug!("Recording coordinator shutting down");
        if let Some((_, token)) = self.pending_capture.take() {
            token.cancel();
        }
        if let Some(mut session) = self.session.take() {
            session.discard();
        }
    }
}

fn discard_sources(mut sources: AcquiredSources) {
    tracing::info!("Releasing capture that arrived for an abandoned session");
    sources.release_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::simulated::{DeviceResponse, SimulatedDevices, SimulatedPlatform};
    use crate::export::DirectoryDownloads;
    use tempfile::tempdir;

    fn spawn(platform: &SimulatedPlatform, dir: &std::path::Path) -> RecorderHandle {
        RecorderHandle::spawn(
            Arc::new(platform.clone()),
            Arc::new(DirectoryDownloads::new(dir)),
            RecorderConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let dir = tempdir().unwrap();
        let platform = SimulatedPlatform::new(SimulatedDevices::default());
        let handle = spawn(&platform, dir.path());

        handle.start(RecordingSettings::default()).await.unwrap();
        let second = handle.start(RecordingSettings::default()).await;

        assert_eq!(second, Err(RecordingError::AlreadyRecording));
        handle.wait_until_settled().await.unwrap();
        handle.stop_and_wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_events_broadcast_for_session() {
        let dir = tempdir().unwrap();
        let platform = SimulatedPlatform::new(SimulatedDevices::default());
        let handle = spawn(&platform, dir.path());
        let mut events = handle.subscribe();

        let id = handle.start(RecordingSettings::default()).await.unwrap();
        handle.wait_until_settled().await.unwrap();
        platform.emit_chunk(vec![7; 8]);
        handle.stop_and_wait().await.unwrap();

        let mut started = false;
        let mut exported = false;
        let mut stopped = false;
        while let Ok(event) = events.try_recv() {
            match event {
                RecordingEvent::Started { session_id, .. } => started = session_id == id,
                RecordingEvent::Exported(summary) => exported = summary.size_bytes == 8,
                RecordingEvent::Stopped { session_id } => stopped = session_id == id,
                _ => {}
            }
        }
        assert!(started && exported && stopped);
    }

    #[tokio::test]
    async fn test_gain_requires_recording() {
        let dir = tempdir().unwrap();
        let platform = SimulatedPlatform::new(SimulatedDevices::default());
        let handle = spawn(&platform, dir.path());

        assert_eq!(
            handle.set_source_gain(SourceKind::Mic, 0.5).await,
            Err(RecordingError::NotRecording)
        );

        handle.start(RecordingSettings::default()).await.unwrap();
        handle.wait_until_settled().await.unwrap();
        assert_eq!(handle.set_source_gain(SourceKind::Mic, 0.5).await, Ok(1));
        assert_eq!(platform.audio_contexts()[0].gains(), vec![0.5]);

        handle.stop_and_wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropping_handle_releases_session() {
        let dir = tempdir().unwrap();
        let platform = SimulatedPlatform::new(SimulatedDevices {
            webcam: DeviceResponse::Deny,
            ..SimulatedDevices::default()
        });
        let handle = spawn(&platform, dir.path());

        handle.start(RecordingSettings::default()).await.unwrap();
        handle.wait_until_settled().await.unwrap();
        let status = handle.status.clone();
        drop(handle);

        // The watch sender closes once the actor has shut down.
        let mut status = status;
        while status.changed().await.is_ok() {}
        assert!(platform.tracks().iter().all(|t| t.stop_count() == 1));
        assert_eq!(platform.audio_contexts()[0].close_count(), 1);
    }
}
