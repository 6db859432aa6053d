//! Recording system module
//!
//! The recording pipeline and its lifecycle:
//! - `machine`: pure state machine driving a session
//! - `session`: owner of one recording's resources
//! - `coordinator`: actor that applies commands and platform events
//! - `composer` and `mime`: combined stream and container negotiation

pub mod composer;
pub mod coordinator;
pub mod error;
pub mod machine;
pub mod mime;
pub mod session;
pub mod state;

pub use coordinator::{RecorderHandle, RecordingEvent};
pub use error::{RecordingError, RecordingResult};
pub use state::{RecorderStatus, RecordingPhase, RecordingQuality, RecordingSettings};
