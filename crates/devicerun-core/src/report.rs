//! Load-test report model and aggregation.

use crate::text::round_to;
use crate::{DeviceId, WorkerResult};
use serde::{Deserialize, Serialize};

/// Durations below this are treated as zero when computing throughput.
const MIN_DURATION_SECS: f64 = 1e-6;

/// Parameters the load test actually ran with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTestConfig {
    /// Workers actually spawned, after clamping to the device pool.
    pub concurrency: usize,
    pub episodes_per_worker: u32,
    /// Episodes of workers that ran to exit.
    pub total_episodes: u64,
    pub prompt: String,
    /// Global timeout in seconds.
    #[serde(rename = "timeout")]
    pub timeout_sec: u64,
}

/// Aggregated load-test metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub total_duration_sec: f64,
    pub successful_workers: usize,
    pub total_workers: usize,
    /// In `[0, 1]`; zero when no worker reported.
    pub success_rate: f64,
    pub avg_worker_duration_sec: f64,
    pub episodes_per_second: f64,
}

impl LoadSummary {
    /// Aggregate worker results collected over `total_duration_sec`.
    pub fn compute(results: &[WorkerResult], total_episodes: u64, total_duration_sec: f64) -> Self {
        let total_workers = results.len();
        let successful_workers = results.iter().filter(|r| r.success).count();
        let (success_rate, avg_worker_duration_sec) = if total_workers == 0 {
            (0.0, 0.0)
        } else {
            let durations: f64 = results.iter().map(|r| r.duration_sec).sum();
            (
                successful_workers as f64 / total_workers as f64,
                durations / total_workers as f64,
            )
        };
        let episodes_per_second = if total_duration_sec > MIN_DURATION_SECS {
            total_episodes as f64 / total_duration_sec
        } else {
            0.0
        };

        Self {
            total_duration_sec: round_to(total_duration_sec, 2),
            successful_workers,
            total_workers,
            success_rate: round_to(success_rate, 3),
            avg_worker_duration_sec: round_to(avg_worker_duration_sec, 2),
            episodes_per_second: round_to(episodes_per_second, 2),
        }
    }
}

/// Everything one load test produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Unix seconds when the report was built.
    pub timestamp: i64,

    #[serde(rename = "test_config")]
    pub config: LoadTestConfig,

    pub summary: LoadSummary,

    /// Worker results in completion order.
    pub worker_results: Vec<WorkerResult>,

    pub devices_used: Vec<DeviceId>,
}

impl LoadReport {
    /// Build the report from collected worker results.
    pub fn build(
        timestamp: i64,
        episodes_per_worker: u32,
        prompt: impl Into<String>,
        timeout_sec: u64,
        devices_used: Vec<DeviceId>,
        worker_results: Vec<WorkerResult>,
        total_duration_sec: f64,
    ) -> Self {
        let total_episodes = worker_results
            .iter()
            .filter(|r| r.outcome().ran_to_exit())
            .map(|r| u64::from(r.episodes_requested))
            .sum();
        let summary = LoadSummary::compute(&worker_results, total_episodes, total_duration_sec);
        Self {
            timestamp,
            config: LoadTestConfig {
                concurrency: devices_used.len(),
                episodes_per_worker,
                total_episodes,
                prompt: prompt.into(),
                timeout_sec,
            },
            summary,
            worker_results,
            devices_used,
        }
    }

    /// The load test passes only if every worker succeeded.
    pub fn passed(&self) -> bool {
        self.summary.total_workers > 0
            && self.summary.successful_workers == self.summary.total_workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(index: usize, code: i32, duration: f64) -> WorkerResult {
        let device = DeviceId::new(format!("localhost:{}", 5555 + index));
        match code {
            -1 => WorkerResult::timed_out(index, device, 2, duration, 300),
            -3 => WorkerResult::incomplete(index, device, 2, duration),
            code => WorkerResult::exited(index, device, 2, duration, code, "", ""),
        }
    }

    #[test]
    fn test_success_rate_three_of_four() {
        let results = vec![
            worker(0, 0, 10.0),
            worker(1, 0, 12.0),
            worker(2, 1, 8.0),
            worker(3, 0, 10.0),
        ];
        let summary = LoadSummary::compute(&results, 8, 20.0);
        assert_eq!(summary.successful_workers, 3);
        assert_eq!(summary.total_workers, 4);
        assert_eq!(summary.success_rate, 0.75);
        assert_eq!(summary.avg_worker_duration_sec, 10.0);
        assert_eq!(summary.episodes_per_second, 0.4);
    }

    #[test]
    fn test_zero_duration_guard() {
        let summary = LoadSummary::compute(&[worker(0, 0, 0.0)], 2, 0.0);
        assert_eq!(summary.episodes_per_second, 0.0);
        let summary = LoadSummary::compute(&[], 0, 0.0);
        assert_eq!(summary.success_rate, 0.0);
    }

    #[test]
    fn test_total_episodes_skips_abandoned_workers() {
        let devices = vec![DeviceId::new("a"), DeviceId::new("b"), DeviceId::new("c")];
        let report = LoadReport::build(
            1_700_000_000,
            2,
            "search for load test",
            600,
            devices,
            vec![worker(0, 0, 5.0), worker(1, -1, 300.0), worker(2, -3, 600.0)],
            600.0,
        );
        assert_eq!(report.config.total_episodes, 2);
        assert_eq!(report.config.concurrency, 3);
        assert!(!report.passed());
    }

    #[test]
    fn test_passed_requires_all_workers() {
        let report = LoadReport::build(
            0,
            1,
            "p",
            10,
            vec![DeviceId::new("a")],
            vec![worker(0, 0, 1.0)],
            1.0,
        );
        assert!(report.passed());
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["test_config"]["timeout"], 10);
        assert_eq!(value["summary"]["success_rate"], 1.0);
    }
}
