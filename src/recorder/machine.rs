//! Recorder state machine
//!
//! Single-writer state machine. User commands and platform callbacks are
//! both turned into [`Event`]s; [`reduce`] maps the current state and one
//! event to the next state plus the [`Effect`]s the coordinator must run.
//! The reducer performs no I/O, so every transition is testable in isolation.

use super::error::RecordingError;
use super::state::{RecordingPhase, RecordingSettings};
use crate::capture::{AcquiredSources, CaptureError, SourceKind, TrackKind};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Why a session is stopping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    User,
    /// A source track ended on the platform side
    TrackEnded(SourceKind),
    RecorderError(String),
    /// The recorder stopped without being asked
    RecorderEnded,
}

/// Authoritative recorder state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Idle,
    Requesting {
        session_id: Uuid,
        settings: RecordingSettings,
    },
    Recording {
        session_id: Uuid,
        mime_type: String,
    },
    Stopping {
        session_id: Uuid,
        reason: StopReason,
        /// Set once the recorder acknowledged the stop and finalization began
        finalizing: bool,
    },
}

impl State {
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            State::Idle => None,
            State::Requesting { session_id, .. }
            | State::Recording { session_id, .. }
            | State::Stopping { session_id, .. } => Some(*session_id),
        }
    }

    pub fn phase(&self) -> RecordingPhase {
        match self {
            State::Idle => RecordingPhase::Idle,
            State::Requesting { .. } => RecordingPhase::Requesting,
            State::Recording { .. } => RecordingPhase::Recording,
            State::Stopping { .. } => RecordingPhase::Stopping,
        }
    }
}

/// Inputs to the state machine
#[derive(Debug)]
pub enum Event {
    /// User pressed start
    StartRequested { settings: RecordingSettings },
    /// User pressed stop
    StopRequested,

    // Acquisition
    CaptureReady {
        id: Uuid,
        sources: AcquiredSources,
    },
    CaptureFailed {
        id: Uuid,
        error: CaptureError,
    },

    // Recorder
    RecorderStarted {
        id: Uuid,
        mime_type: String,
    },
    RecorderFailed {
        id: Uuid,
        error: RecordingError,
    },
    DataAvailable {
        id: Uuid,
        data: Vec<u8>,
    },
    RecorderStopped {
        id: Uuid,
    },

    /// A source track ended without us stopping it
    TrackEnded {
        id: Uuid,
        source: SourceKind,
        kind: TrackKind,
    },

    /// Finalizer finished, with or without an artifact
    Finalized { id: Uuid },
}

impl Event {
    fn session_id(&self) -> Option<Uuid> {
        match self {
            Event::StartRequested { .. } | Event::StopRequested => None,
            Event::CaptureReady { id, .. }
            | Event::CaptureFailed { id, .. }
            | Event::RecorderStarted { id, .. }
            | Event::RecorderFailed { id, .. }
            | Event::DataAvailable { id, .. }
            | Event::RecorderStopped { id }
            | Event::TrackEnded { id, .. }
            | Event::Finalized { id } => Some(*id),
        }
    }
}

/// Work for the coordinator to perform after a transition
#[derive(Debug)]
pub enum Effect {
    /// Begin acquiring sources in the background
    AcquireCapture {
        id: Uuid,
        settings: RecordingSettings,
    },
    /// Abandon a pending acquisition and roll back what it holds
    CancelCapture { id: Uuid },
    /// Form the session from freshly acquired sources
    AdoptCapture {
        id: Uuid,
        settings: RecordingSettings,
        sources: AcquiredSources,
    },
    /// Release sources that arrived for an attempt that no longer exists
    DiscardCapture { sources: AcquiredSources },
    /// Mix, compose, negotiate the container and start the recorder
    StartRecorder { id: Uuid },
    AppendChunk { id: Uuid, data: Vec<u8> },
    StopRecorder { id: Uuid },
    /// Stop tracks, clear the preview and close the audio context
    ReleaseSession { id: Uuid },
    /// Build and deliver the artifact, then end the session
    Finalize { id: Uuid },
    /// End the session without an artifact
    DiscardSession { id: Uuid },
    ReportError { message: String },
    EmitStatus,
}

/// Reducer: (state, event) -> (next_state, effects)
///
/// - Events tagged with a session other than the current one are ignored,
///   except late capture results, which are released.
/// - Start while a session exists and stop while idle or stopping change nothing.
pub fn reduce(state: &State, event: Event) -> (State, Vec<Effect>) {
    use Effect::*;

    // Stale events
    if let Some(eid) = event.session_id() {
        if state.session_id() != Some(eid) {
            return match event {
                Event::CaptureReady { sources, .. } => {
                    tracing::debug!("Releasing capture for stale session {}", eid);
                    (state.clone(), vec![DiscardCapture { sources }])
                }
                other => {
                    tracing::trace!("Ignoring stale event {:?}", other);
                    (state.clone(), vec![])
                }
            };
        }
    }

    match (state, event) {
        // -----------------
        // Idle
        // -----------------
        (State::Idle, Event::StartRequested { settings }) => {
            let id = Uuid::new_v4();
            (
                State::Requesting {
                    session_id: id,
                    settings,
                },
                vec![AcquireCapture { id, settings }, EmitStatus],
            )
        }

        // -----------------
        // Requesting
        // -----------------
        (
            State::Requesting {
                session_id,
                settings,
            },
            Event::CaptureReady { sources, .. },
        ) => (
            state.clone(),
            vec![
                AdoptCapture {
                    id: *session_id,
                    settings: *settings,
                    sources,
                },
                StartRecorder { id: *session_id },
            ],
        ),
        (State::Requesting { session_id, .. }, Event::CaptureFailed { error, .. }) => (
            State::Idle,
            vec![
                ReportError {
                    message: format!("Recording could not start: {error}"),
                },
                DiscardSession { id: *session_id },
                EmitStatus,
            ],
        ),
        (State::Requesting { session_id, .. }, Event::RecorderStarted { mime_type, .. }) => (
            State::Recording {
                session_id: *session_id,
                mime_type,
            },
            vec![EmitStatus],
        ),
        (State::Requesting { session_id, .. }, Event::RecorderFailed { error, .. }) => (
            State::Idle,
            vec![
                ReportError {
                    message: format!("Recording could not start: {error}"),
                },
                DiscardSession { id: *session_id },
                EmitStatus,
            ],
        ),
        // Cancel before recording began
        (State::Requesting { session_id, .. }, Event::StopRequested) => (
            State::Idle,
            vec![
                CancelCapture { id: *session_id },
                DiscardSession { id: *session_id },
                EmitStatus,
            ],
        ),

        // -----------------
        // Recording
        // -----------------
        (State::Recording { session_id, .. }, Event::DataAvailable { data, .. }) => {
            if data.is_empty() {
                (state.clone(), vec![])
            } else {
                (
                    state.clone(),
                    vec![
                        AppendChunk {
                            id: *session_id,
                            data,
                        },
                        EmitStatus,
                    ],
                )
            }
        }
        (State::Recording { session_id, .. }, Event::StopRequested) => (
            stopping(*session_id, StopReason::User),
            vec![StopRecorder { id: *session_id }, EmitStatus],
        ),
        (
            State::Recording { session_id, .. },
            Event::TrackEnded {
                source: SourceKind::Display,
                kind: TrackKind::Video,
                ..
            },
        ) => {
            tracing::warn!("Display capture ended, stopping session {}", session_id);
            (
                stopping(*session_id, StopReason::TrackEnded(SourceKind::Display)),
                vec![StopRecorder { id: *session_id }, EmitStatus],
            )
        }
        (State::Recording { .. }, Event::TrackEnded { source, kind, .. }) => {
            tracing::warn!("{} {:?} track ended, continuing without it", source, kind);
            (state.clone(), vec![])
        }
        (State::Recording { session_id, .. }, Event::RecorderFailed { error, .. }) => {
            let message = error.to_string();
            (
                stopping(*session_id, StopReason::RecorderError(message.clone())),
                vec![
                    ReportError { message },
                    StopRecorder { id: *session_id },
                    EmitStatus,
                ],
            )
        }
        // The platform stopped the recorder on its own
        (State::Recording { session_id, .. }, Event::RecorderStopped { .. }) => (
            State::Stopping {
                session_id: *session_id,
                reason: StopReason::RecorderEnded,
                finalizing: true,
            },
            vec![
                ReleaseSession { id: *session_id },
                Finalize { id: *session_id },
                EmitStatus,
            ],
        ),

        // -----------------
        // Stopping
        // -----------------
        // Final flush arrives before the stop acknowledgment
        (
            State::Stopping {
                session_id,
                finalizing: false,
                ..
            },
            Event::DataAvailable { data, .. },
        ) if !data.is_empty() => (
            state.clone(),
            vec![
                AppendChunk {
                    id: *session_id,
                    data,
                },
                EmitStatus,
            ],
        ),
        (
            State::Stopping {
                session_id,
                reason,
                finalizing: false,
            },
            Event::RecorderStopped { .. },
        ) => (
            State::Stopping {
                session_id: *session_id,
                reason: reason.clone(),
                finalizing: true,
            },
            vec![ReleaseSession { id: *session_id }, Finalize { id: *session_id }],
        ),
        // An encoder that failed while stopping will not acknowledge
        (
            State::Stopping {
                session_id,
                reason,
                finalizing: false,
            },
            Event::RecorderFailed { error, .. },
        ) => (
            State::Stopping {
                session_id: *session_id,
                reason: reason.clone(),
                finalizing: true,
            },
            vec![
                ReportError {
                    message: error.to_string(),
                },
                ReleaseSession { id: *session_id },
                Finalize { id: *session_id },
            ],
        ),
        (State::Stopping { session_id, .. }, Event::Finalized { .. }) => {
            tracing::info!("Session {} finished", session_id);
            (State::Idle, vec![EmitStatus])
        }

        // -----------------
        // Guards and no-ops
        // -----------------
        (_, Event::StartRequested { .. }) => {
            tracing::warn!("Start ignored, a session is already active");
            (state.clone(), vec![])
        }
        (_, Event::StopRequested) => {
            tracing::debug!("Stop ignored in {:?}", state.phase());
            (state.clone(), vec![])
        }
        (_, event) => {
            tracing::debug!("Unhandled event in {:?}: {:?}", state.phase(), event);
            (state.clone(), vec![])
        }
    }
}

fn stopping(session_id: Uuid, reason: StopReason) -> State {
    State::Stopping {
        session_id,
        reason,
        finalizing: false,
    }
}

/// Channel through which platform recorders and track watchers report back.
///
/// Every message is tagged with the session the sink was created for, so
/// reports from a finished session are recognised as stale.
#[derive(Debug, Clone)]
pub struct RecorderEventSink {
    session_id: Uuid,
    tx: mpsc::UnboundedSender<Event>,
}

impl RecorderEventSink {
    pub fn new(session_id: Uuid, tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { session_id, tx }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Deliver a slice. Returns false once nobody is listening.
    pub fn data_available(&self, data: Vec<u8>) -> bool {
        self.tx
            .send(Event::DataAvailable {
                id: self.session_id,
                data,
            })
            .is_ok()
    }

    /// Acknowledge a stop request
    pub fn stopped(&self) -> bool {
        self.tx
            .send(Event::RecorderStopped {
                id: self.session_id,
            })
            .is_ok()
    }

    pub fn error(&self, message: String) -> bool {
        self.tx
            .send(Event::RecorderFailed {
                id: self.session_id,
                error: RecordingError::Encoder(message),
            })
            .is_ok()
    }

    pub fn track_ended(&self, source: SourceKind, kind: TrackKind) -> bool {
        self.tx
            .send(Event::TrackEnded {
                id: self.session_id,
                source,
                kind,
            })
            .is_ok()
    }
}
