//! Error types for device backends.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while driving a device.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend executable could not be started.
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure while talking to the backend process.
    #[error("Backend I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The call exceeded its budget and was killed.
    #[error("timeout after {}s", .0.as_secs_f64())]
    Timeout(Duration),
}

impl BackendError {
    /// Returns true if the call ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
