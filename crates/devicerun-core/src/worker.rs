//! Per-worker load-test results.

use crate::status::{
    WorkerOutcome, RETURN_CODE_CRASHED, RETURN_CODE_INCOMPLETE, RETURN_CODE_TIMEOUT,
};
use crate::text::{round_to, tail};
use crate::DeviceId;
use serde::{Deserialize, Serialize};

/// Characters of worker stdout kept in the report.
pub const STDOUT_TAIL_CHARS: usize = 1000;
/// Characters of worker stderr kept in the report.
pub const STDERR_TAIL_CHARS: usize = 500;

/// What one worker produced, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    /// Worker index in submission order.
    #[serde(rename = "worker")]
    pub worker_index: usize,

    /// Device the worker held exclusively.
    #[serde(rename = "serial")]
    pub device_id: DeviceId,

    /// Episodes the worker was asked to run.
    #[serde(rename = "episodes")]
    pub episodes_requested: u32,

    pub success: bool,

    pub duration_sec: f64,

    #[serde(rename = "returncode")]
    pub return_code: i32,

    /// `[episode ...]` summary lines reported by the worker.
    #[serde(rename = "episode_results")]
    pub episode_summaries: Vec<String>,

    pub stdout_tail: String,

    pub stderr_tail: String,
}

impl WorkerResult {
    /// Result of a worker that ran to exit.
    pub fn exited(
        worker_index: usize,
        device_id: DeviceId,
        episodes_requested: u32,
        duration_sec: f64,
        return_code: i32,
        stdout: &str,
        stderr: &str,
    ) -> Self {
        let success = return_code == 0;
        // Summaries are only trusted from a clean exit.
        let episode_summaries = if success {
            stdout
                .lines()
                .filter(|line| line.starts_with("[episode "))
                .map(|line| line.trim().to_string())
                .collect()
        } else {
            Vec::new()
        };
        Self {
            worker_index,
            device_id,
            episodes_requested,
            success,
            duration_sec: round_to(duration_sec, 2),
            return_code,
            episode_summaries,
            stdout_tail: tail(stdout, STDOUT_TAIL_CHARS),
            stderr_tail: tail(stderr, STDERR_TAIL_CHARS),
        }
    }

    /// Worker killed after its own timeout.
    pub fn timed_out(
        worker_index: usize,
        device_id: DeviceId,
        episodes_requested: u32,
        duration_sec: f64,
        timeout_secs: u64,
    ) -> Self {
        Self::abnormal(
            worker_index,
            device_id,
            episodes_requested,
            duration_sec,
            RETURN_CODE_TIMEOUT,
            "TIMEOUT".to_string(),
            format!("Process timed out after {timeout_secs}s"),
        )
    }

    /// Worker that failed to launch or crashed.
    pub fn crashed(
        worker_index: usize,
        device_id: DeviceId,
        episodes_requested: u32,
        duration_sec: f64,
        error: &str,
    ) -> Self {
        Self::abnormal(
            worker_index,
            device_id,
            episodes_requested,
            duration_sec,
            RETURN_CODE_CRASHED,
            String::new(),
            tail(&format!("Exception: {error}"), STDERR_TAIL_CHARS),
        )
    }

    /// Worker still pending when the global timeout elapsed.
    pub fn incomplete(
        worker_index: usize,
        device_id: DeviceId,
        episodes_requested: u32,
        duration_sec: f64,
    ) -> Self {
        Self::abnormal(
            worker_index,
            device_id,
            episodes_requested,
            duration_sec,
            RETURN_CODE_INCOMPLETE,
            "INCOMPLETE".to_string(),
            "Worker still running when the global timeout elapsed".to_string(),
        )
    }

    fn abnormal(
        worker_index: usize,
        device_id: DeviceId,
        episodes_requested: u32,
        duration_sec: f64,
        return_code: i32,
        stdout_tail: String,
        stderr_tail: String,
    ) -> Self {
        Self {
            worker_index,
            device_id,
            episodes_requested,
            success: false,
            duration_sec: round_to(duration_sec, 2),
            return_code,
            episode_summaries: Vec::new(),
            stdout_tail,
            stderr_tail,
        }
    }

    /// Classify how the worker ended.
    pub fn outcome(&self) -> WorkerOutcome {
        WorkerOutcome::from_return_code(self.return_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exited_parses_episode_lines() {
        let stdout = "noise\n\
                      [episode 0] success=true latency=1.2s flaky=0\n\
                      [episode 1] success=false latency=3s flaky=0\n";
        let device = DeviceId::new("localhost:5555");
        let result = WorkerResult::exited(0, device, 2, 4.567, 0, stdout, "");
        assert!(result.success);
        assert_eq!(result.episode_summaries.len(), 2);
        assert_eq!(result.duration_sec, 4.57);
        assert_eq!(result.outcome(), WorkerOutcome::Succeeded);
    }

    #[test]
    fn test_nonzero_exit_is_failure() {
        let result =
            WorkerResult::exited(1, DeviceId::new("d"), 2, 1.0, 3, "[episode 0] x", "boom");
        assert!(!result.success);
        assert!(result.episode_summaries.is_empty());
        assert_eq!(result.stderr_tail, "boom");
    }

    #[test]
    fn test_timed_out_marker() {
        let result = WorkerResult::timed_out(2, DeviceId::new("d"), 5, 300.01, 300);
        assert!(!result.success);
        assert_eq!(result.return_code, RETURN_CODE_TIMEOUT);
        assert_eq!(result.stdout_tail, "TIMEOUT");
        assert_eq!(result.outcome(), WorkerOutcome::TimedOut);
    }

    #[test]
    fn test_serialized_field_names() {
        let result = WorkerResult::incomplete(0, DeviceId::new("d"), 1, 0.0);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["worker"], 0);
        assert_eq!(value["serial"], "d");
        assert_eq!(value["returncode"], RETURN_CODE_INCOMPLETE);
        assert!(value["episode_results"].as_array().unwrap().is_empty());
    }
}
