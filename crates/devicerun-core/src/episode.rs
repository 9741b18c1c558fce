//! Episode outcomes and their per-run records.

use crate::RunId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome of one episode: a task attempted with bounded retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeResult {
    /// Task name.
    pub task: String,

    /// Task parameters as planned.
    pub params: Map<String, Value>,

    /// Success flag of the last attempt.
    pub success: bool,

    /// Latency summed over every attempt.
    pub latency_sec: f64,

    /// Number of executor invocations, between 1 and `max_retries + 1`.
    pub attempts: u32,

    /// Succeeded, but not on the first attempt.
    pub flaky: bool,

    /// Tail of the last attempt's details.
    pub details: String,
}

impl EpisodeResult {
    /// Single line summary, parsed back by the load orchestrator.
    pub fn summary_line(&self, episode: usize) -> String {
        format!(
            "[episode {}] success={} latency={}s flaky={}",
            episode,
            self.success,
            self.latency_sec,
            u8::from(self.flaky)
        )
    }
}

/// An [`EpisodeResult`] tagged with its position in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    /// Zero-based episode index within the run.
    pub episode: usize,

    /// Run this episode belongs to.
    pub run_id: RunId,

    #[serde(flatten)]
    pub result: EpisodeResult,
}

impl EpisodeRecord {
    pub fn new(run_id: RunId, episode: usize, result: EpisodeResult) -> Self {
        Self {
            episode,
            run_id,
            result,
        }
    }
}
