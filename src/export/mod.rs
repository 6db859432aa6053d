//! Recording export
//!
//! Turns a session's chunk sequence into one artifact and hands it to a
//! download target. No transcoding happens here; containers that may not
//! play everywhere come with a compatibility hint instead.

pub mod download;
pub mod finalizer;
pub mod types;

pub use download::{DirectoryDownloads, DownloadTarget};
pub use finalizer::{finalize, recording_file_name};
pub use types::{Artifact, CompatibilityHint, ExportError, ExportSummary};
