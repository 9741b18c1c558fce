//! Load test configuration.

use std::path::PathBuf;
use std::time::Duration;

/// What to run: workers, episodes and the shared prompt.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    /// Workers requested; clamped to the device pool.
    pub requested_workers: usize,

    /// Episodes each worker runs.
    pub episodes_per_worker: u32,

    /// Prompt every worker plans.
    pub prompt: String,
}

impl Default for LoadPlan {
    fn default() -> Self {
        Self {
            requested_workers: 2,
            episodes_per_worker: 5,
            prompt: "search for load test".to_string(),
        }
    }
}

/// Orchestrator budgets and output location.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// A worker running longer than this is killed.
    pub worker_timeout: Duration,

    /// Workers still pending after this are recorded as incomplete.
    pub global_timeout: Duration,

    /// Where load reports are written.
    pub results_dir: PathBuf,

    /// Write `load_test_<ts>.json` and `load_report.md` after each run.
    pub write_report: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_timeout: Duration::from_secs(300),
            global_timeout: Duration::from_secs(600),
            results_dir: PathBuf::from("results"),
            write_report: true,
        }
    }
}
