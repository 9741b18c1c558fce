//! Agent configuration.

use std::path::PathBuf;
use std::time::Duration;

use devicerun_trace::TraceConfig;

/// Per-primitive time budgets and executor thresholds.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Budget for the pre-flight healthcheck.
    pub healthcheck_timeout: Duration,

    /// Single key events and status bar commands.
    pub keypress_timeout: Duration,

    /// Taps, swipes, text input and system toggles.
    pub input_timeout: Duration,

    /// App, settings and browser launches.
    pub launch_timeout: Duration,

    /// Screen capture.
    pub capture_timeout: Duration,

    /// Tasks slower than this are flagged as timeouts.
    pub slow_threshold: Duration,

    /// Pause between repeated steps of a multi-step primitive.
    pub step_pause: Duration,

    /// Where screenshots are written.
    pub results_dir: PathBuf,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            healthcheck_timeout: Duration::from_secs(5),
            keypress_timeout: Duration::from_secs(5),
            input_timeout: Duration::from_secs(10),
            launch_timeout: Duration::from_secs(20),
            capture_timeout: Duration::from_secs(15),
            slow_threshold: Duration::from_secs(10),
            step_pause: Duration::from_millis(300),
            results_dir: PathBuf::from("results"),
        }
    }
}

/// Retry policy for the episode harness.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Sleep between a failed attempt and the next one.
    pub backoff: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(500),
        }
    }
}

/// Everything one agent run needs.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Path to the adb executable, used by whoever builds the backend.
    pub adb_path: String,

    /// Device serial; `None` uses adb's default device.
    pub serial: Option<String>,

    /// Episodes to run.
    pub episodes: usize,

    /// Prompt planned into a task once per run.
    pub prompt: String,

    /// Retries per episode after the first attempt.
    pub max_retries: u32,

    /// Run id override; defaults to `run_<unix seconds>`.
    pub run_id: Option<String>,

    /// Write JSON, CSV, markdown and HTML records into the results directory.
    pub write_records: bool,

    pub executor: ExecutorConfig,
    pub harness: HarnessConfig,
    pub trace: TraceConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            adb_path: "adb".to_string(),
            serial: None,
            episodes: 5,
            prompt: "search for qualgent test".to_string(),
            max_retries: 1,
            run_id: None,
            write_records: true,
            executor: ExecutorConfig::default(),
            harness: HarnessConfig::default(),
            trace: TraceConfig::default(),
        }
    }
}
