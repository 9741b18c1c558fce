//! Worker outcome classification and its return-code encoding.

use serde::{Deserialize, Serialize};

/// Return code recorded when a worker exceeded its own timeout.
pub const RETURN_CODE_TIMEOUT: i32 = -1;
/// Return code recorded when a worker could not be launched or crashed.
pub const RETURN_CODE_CRASHED: i32 = -2;
/// Return code recorded when a worker was still pending at the global timeout.
pub const RETURN_CODE_INCOMPLETE: i32 = -3;

/// How a load-test worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerOutcome {
    /// Ran to completion with exit code 0.
    Succeeded,
    /// Ran to completion with a non-zero exit code.
    Failed,
    /// Killed after exceeding the per-worker timeout.
    TimedOut,
    /// Could not be launched, or panicked.
    Crashed,
    /// Abandoned when the global timeout elapsed.
    Incomplete,
}

impl WorkerOutcome {
    /// Classify a recorded return code.
    pub fn from_return_code(code: i32) -> Self {
        match code {
            0 => Self::Succeeded,
            RETURN_CODE_TIMEOUT => Self::TimedOut,
            RETURN_CODE_CRASHED => Self::Crashed,
            RETURN_CODE_INCOMPLETE => Self::Incomplete,
            _ => Self::Failed,
        }
    }

    /// Returns true if the worker's process ran to exit.
    pub fn ran_to_exit(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}
