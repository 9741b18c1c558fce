//! Core domain errors.

use thiserror::Error;

/// Core domain errors for devicerun.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Task name has no matching primitive.
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// A task parameter could not be interpreted.
    #[error("Invalid parameter '{param}' for task '{task}': {reason}")]
    InvalidParam {
        task: String,
        param: String,
        reason: String,
    },
}
