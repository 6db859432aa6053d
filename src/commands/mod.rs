//! Command handlers
//!
//! Entry points for the settings menu and the start/stop control. Each
//! handler returns an [`ErrorResponse`](crate::utils::ErrorResponse) on
//! failure so callers get a stable error code.

pub mod recording;
