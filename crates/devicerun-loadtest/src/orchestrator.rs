//! Load orchestrator - fans workers out across the device pool.
//!
//! Each worker is pinned to one device for its whole life. Workers run as
//! independent tokio tasks and are collected in completion order; a worker
//! that overruns its own budget or the global deadline is aborted, which drops
//! its launcher future and with it any child process.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use devicerun_core::{DeviceId, LoadReport, RunId, WorkerResult};
use devicerun_trace::Tracer;
use serde_json::json;
use thiserror::Error;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::{LoadPlan, OrchestratorConfig};
use crate::launcher::{WorkerAssignment, WorkerLauncher};
use crate::registry::{DeviceRegistry, RegistryError};
use crate::report::{ReportError, ReportWriter};

/// Deadline distance used when the global timeout does not fit an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("No devices available")]
    NoDevices,

    #[error("Invalid load plan: {0}")]
    InvalidPlan(String),

    #[error("Device discovery failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("Failed to write load report: {0}")]
    Report(#[from] ReportError),
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs load tests.
pub struct LoadOrchestrator {
    registry: Arc<dyn DeviceRegistry>,
    launcher: Arc<dyn WorkerLauncher>,
    config: OrchestratorConfig,
    tracer: Option<Arc<Tracer>>,
}

impl LoadOrchestrator {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        launcher: Arc<dyn WorkerLauncher>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            launcher,
            config,
            tracer: None,
        }
    }

    /// Record one `worker` span per worker.
    pub fn with_tracer(mut self, tracer: Arc<Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Run one load test to completion or to the global timeout.
    pub async fn run_load_test(&self, plan: &LoadPlan) -> Result<LoadReport, OrchestratorError> {
        if plan.requested_workers == 0 {
            return Err(OrchestratorError::InvalidPlan(
                "at least one worker is required".to_string(),
            ));
        }

        let pool = dedupe(self.registry.discover().await?);
        if pool.is_empty() {
            error!("No devices available, not starting any workers");
            return Err(OrchestratorError::NoDevices);
        }

        let actual = plan.requested_workers.min(pool.len());
        if actual < plan.requested_workers {
            warn!(
                requested = plan.requested_workers,
                available = pool.len(),
                actual,
                "Not enough devices, limiting workers"
            );
        }
        let devices: Vec<DeviceId> = pool.into_iter().take(actual).collect();

        let timestamp = Utc::now().timestamp();
        info!(
            workers = actual,
            episodes_per_worker = plan.episodes_per_worker,
            devices = ?devices,
            "Starting load test"
        );

        let started = Instant::now();
        let deadline = started
            .checked_add(self.config.global_timeout)
            .unwrap_or_else(|| started + FAR_FUTURE);
        let mut join_set = JoinSet::new();
        for (index, device) in devices.iter().enumerate() {
            let assignment = WorkerAssignment {
                worker_index: index,
                device: device.clone(),
                episodes: plan.episodes_per_worker,
                prompt: plan.prompt.clone(),
                run_id: RunId::for_worker(timestamp, index),
            };
            join_set.spawn(run_worker(
                self.launcher.clone(),
                self.tracer.clone(),
                assignment,
                self.config.worker_timeout,
            ));
        }

        let mut results: Vec<WorkerResult> = Vec::with_capacity(actual);
        let mut deadline_hit = false;
        loop {
            match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(Ok(result))) => {
                    info!(
                        worker = result.worker_index,
                        success = result.success,
                        duration_sec = result.duration_sec,
                        "Worker completed"
                    );
                    results.push(result);
                }
                Ok(Some(Err(e))) => error!(error = %e, "Worker task failed"),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        pending = join_set.len(),
                        timeout_secs = self.config.global_timeout.as_secs(),
                        "Global timeout elapsed, aborting pending workers"
                    );
                    deadline_hit = true;
                    join_set.abort_all();
                    while join_set.join_next().await.is_some() {}
                    break;
                }
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        let reported: HashSet<usize> = results.iter().map(|r| r.worker_index).collect();
        for (index, device) in devices.iter().enumerate() {
            if reported.contains(&index) {
                continue;
            }
            let missing = if deadline_hit {
                WorkerResult::incomplete(index, device.clone(), plan.episodes_per_worker, elapsed)
            } else {
                WorkerResult::crashed(
                    index,
                    device.clone(),
                    plan.episodes_per_worker,
                    elapsed,
                    "worker task failed",
                )
            };
            results.push(missing);
        }

        let report = LoadReport::build(
            timestamp,
            plan.episodes_per_worker,
            plan.prompt.clone(),
            self.config.global_timeout.as_secs(),
            devices,
            results,
            elapsed,
        );
        info!(
            successful = report.summary.successful_workers,
            total = report.summary.total_workers,
            duration_sec = report.summary.total_duration_sec,
            episodes_per_second = report.summary.episodes_per_second,
            "Load test finished"
        );

        if self.config.write_report {
            ReportWriter::new(&self.config.results_dir).write(&report)?;
        }
        Ok(report)
    }
}

/// One worker: launch, bound by `worker_timeout`, classify the outcome.
async fn run_worker(
    launcher: Arc<dyn WorkerLauncher>,
    tracer: Option<Arc<Tracer>>,
    assignment: WorkerAssignment,
    worker_timeout: Duration,
) -> WorkerResult {
    let mut span = tracer.as_deref().map(|tracer| {
        let mut span = tracer.span(
            "worker",
            json!({
                "worker": assignment.worker_index,
                "serial": assignment.device.as_str(),
                "episodes": assignment.episodes,
                "run_id": assignment.run_id.as_str(),
            }),
        );
        // Overwritten below unless the task is aborted first.
        span.fail("incomplete");
        span
    });

    let index = assignment.worker_index;
    let device = assignment.device.clone();
    let episodes = assignment.episodes;
    let started = Instant::now();

    // A separate task so a panicking launcher surfaces as a JoinError here.
    let mut handle = AbortOnDrop(tokio::spawn(async move { launcher.launch(assignment).await }));
    let outcome = tokio::time::timeout(worker_timeout, &mut handle.0).await;
    let duration = started.elapsed().as_secs_f64();

    let result = match outcome {
        Ok(Ok(Ok(output))) => WorkerResult::exited(
            index,
            device,
            episodes,
            duration,
            output.return_code,
            &output.stdout,
            &output.stderr,
        ),
        Ok(Ok(Err(e))) => {
            warn!(worker = index, error = %e, "Worker failed to launch");
            WorkerResult::crashed(index, device, episodes, duration, &e.to_string())
        }
        Ok(Err(e)) => {
            error!(worker = index, error = %e, "Worker panicked");
            WorkerResult::crashed(index, device, episodes, duration, &e.to_string())
        }
        Err(_) => {
            warn!(worker = index, timeout_secs = worker_timeout.as_secs(), "Worker timed out");
            handle.0.abort();
            WorkerResult::timed_out(index, device, episodes, duration, worker_timeout.as_secs())
        }
    };

    if let Some(span) = span.as_mut() {
        span.set_attr("returncode", result.return_code);
        span.set_attr("duration_sec", result.duration_sec);
        if result.success {
            span.succeed();
        } else {
            span.fail(format!("returncode {}", result.return_code));
        }
    }
    result
}

/// Drop repeated devices, keeping first-seen order.
fn dedupe(devices: Vec<DeviceId>) -> Vec<DeviceId> {
    let mut seen = HashSet::new();
    devices
        .into_iter()
        .filter(|device| seen.insert(device.clone()))
        .collect()
}
