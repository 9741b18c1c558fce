//! Tracer configuration.

use std::path::{Path, PathBuf};

use devicerun_core::RunId;

/// Where and how spans are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    /// Directory holding `trace_<run_id>.jsonl` files.
    pub dir: PathBuf,

    /// Mirror every span to stdout as a structured log line.
    pub mirror_stdout: bool,

    /// Lines buffered for the stdout mirror before new ones are dropped.
    pub mirror_capacity: usize,
}

impl TraceConfig {
    /// Config writing into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Builder method to toggle the stdout mirror.
    pub fn with_mirror_stdout(mut self, enabled: bool) -> Self {
        self.mirror_stdout = enabled;
        self
    }

    /// Trace file path for a run.
    pub fn path_for(&self, run_id: &RunId) -> PathBuf {
        trace_path(&self.dir, run_id)
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("observability"),
            mirror_stdout: true,
            mirror_capacity: 1024,
        }
    }
}

fn trace_path(dir: &Path, run_id: &RunId) -> PathBuf {
    dir.join(format!("trace_{run_id}.jsonl"))
}
