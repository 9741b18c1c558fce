//! Error types for the tracer.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while opening or reading a trace log.
#[derive(Debug, Error)]
pub enum TraceError {
    /// The trace directory or file could not be opened.
    #[error("Failed to open trace log '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading an existing trace log failed.
    #[error("Failed to read trace log '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A trace line did not parse as a span record.
    #[error("Malformed span on line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}
