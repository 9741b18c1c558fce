//! The span record written to the trace log.

use std::path::Path;

use devicerun_core::{RunId, TraceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TraceError;

/// Status of a span whose work completed normally.
pub const STATUS_OK: &str = "OK";

/// One timed, attributed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    /// Wall-clock emission time, RFC 3339 UTC.
    pub ts: String,
    pub run_id: RunId,
    pub trace_id: TraceId,
    /// Span name.
    pub span: String,
    pub start_ns: i64,
    pub end_ns: i64,
    pub dur_ms: f64,
    pub attrs: Value,
    /// `OK` or `ERROR:<message>`.
    pub status: String,
}

impl SpanRecord {
    /// Returns true if the wrapped work failed.
    pub fn is_error(&self) -> bool {
        self.status.starts_with("ERROR:")
    }
}

/// Parse every line of a trace log.
pub fn read_spans(path: &Path) -> Result<Vec<SpanRecord>, TraceError> {
    let content = std::fs::read_to_string(path).map_err(|source| TraceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| TraceError::Malformed {
                line: idx + 1,
                source,
            })
        })
        .collect()
}
