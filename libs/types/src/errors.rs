//! Error types for the time-window cache
//!
//! Comprehensive error taxonomy using thiserror

use thiserror::Error;

/// Errors raised by list and window operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WindowError {
    #[error("cannot use a list after it was merged into another")]
    UsedAfterDestroy,

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Fetch failed at anchor {anchor:?}: {reason}")]
    FetchFailure { anchor: Option<f64>, reason: String },

    #[error("Record at {time} would break time order at boundary {boundary}")]
    OutOfOrder { time: f64, boundary: f64 },

    #[error("Undecodable record payload: {reason}")]
    Decode { reason: String },
}

impl WindowError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        WindowError::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Failures of the historical collaborator are caught by the load queue;
    /// everything else is a caller error.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, WindowError::FetchFailure { .. })
    }
}
