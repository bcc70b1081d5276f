//! Sync error types.

use thiserror::Error;

/// Errors that can end a sync round.
///
/// Every variant leaves the local database exactly as it was before the
/// round started, so re-running the round is always safe.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No endpoint (or an unusable one) is configured. Raised before any I/O.
    #[error("sync not configured: {0}")]
    Configuration(String),

    /// Connection, timeout or HTTP status failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with something we cannot use.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The local transaction failed and was rolled back.
    #[error("local storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl SyncError {
    /// Whether the request may be resent automatically.
    ///
    /// Only transport failures qualify; configuration and protocol errors
    /// would fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SyncError::Protocol(e.to_string())
        } else {
            SyncError::Transport(e.to_string())
        }
    }
}
