//! Episode harness: one task, bounded retries, flakiness accounting.

use std::sync::Arc;

use devicerun_core::{round_millis, tail, EpisodeRecord, EpisodeResult, RunId, TaskResult, TaskSpec};
use devicerun_trace::Tracer;
use serde_json::json;
use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::executor::TaskRunner;

/// Characters of the last attempt's details kept on the episode.
pub const EPISODE_DETAIL_CHARS: usize = 400;

/// Runs episodes through a [`TaskRunner`], retrying failed attempts.
pub struct EpisodeHarness {
    runner: Arc<dyn TaskRunner>,
    tracer: Arc<Tracer>,
    config: HarnessConfig,
}

impl EpisodeHarness {
    pub fn new(runner: Arc<dyn TaskRunner>, tracer: Arc<Tracer>, config: HarnessConfig) -> Self {
        Self {
            runner,
            tracer,
            config,
        }
    }

    /// Run one episode: up to `max_retries + 1` attempts, stopping at the first success.
    pub async fn run_episode(&self, task: &TaskSpec, max_retries: u32) -> EpisodeResult {
        let mut span = self.tracer.span(
            "episode",
            json!({"task": task.name, "max_retries": max_retries}),
        );

        let mut calls: u32 = 0;
        let mut total_latency = 0.0;
        let (last, first_ok) = loop {
            let result = self.attempt(task, calls).await;
            calls += 1;
            total_latency += result.latency_sec;

            if result.success {
                break (result, calls == 1);
            }
            if calls > max_retries {
                break (result, false);
            }

            warn!(
                task = %task.name,
                attempt = calls,
                details = %tail(&result.details, 120),
                "Attempt failed, retrying"
            );
            tokio::time::sleep(self.config.backoff).await;
        };

        let episode = EpisodeResult {
            task: task.name.clone(),
            params: task.params.clone(),
            success: last.success,
            latency_sec: round_millis(total_latency),
            attempts: calls,
            flaky: last.success && !first_ok,
            details: tail(&last.details, EPISODE_DETAIL_CHARS),
        };

        span.set_attr("success", episode.success);
        span.set_attr("attempts", episode.attempts);
        span.set_attr("flaky", episode.flaky);
        span.set_attr("latency_sec", episode.latency_sec);
        episode
    }

    async fn attempt(&self, task: &TaskSpec, index: u32) -> TaskResult {
        let mut span = self
            .tracer
            .span("attempt", json!({"task": task.name, "attempt": index}));
        let result = self.runner.run_task(task).await;
        span.set_attr("latency_sec", result.latency_sec);
        span.set_attr("timeout", result.timeout);
        if !result.success {
            span.fail(tail(&result.details, 200));
        }
        result
    }

    /// Run `episodes` episodes of the same task in order.
    ///
    /// `on_episode` sees each record as soon as it completes.
    pub async fn run_many<F>(
        &self,
        run_id: &RunId,
        task: &TaskSpec,
        episodes: usize,
        max_retries: u32,
        mut on_episode: F,
    ) -> Vec<EpisodeRecord>
    where
        F: FnMut(&EpisodeRecord) + Send,
    {
        let mut records = Vec::with_capacity(episodes);
        for index in 0..episodes {
            let result = self.run_episode(task, max_retries).await;
            let record = EpisodeRecord::new(run_id.clone(), index, result);
            on_episode(&record);
            records.push(record);
        }

        let succeeded = records.iter().filter(|r| r.result.success).count();
        info!(run_id = %run_id, episodes, succeeded, "Episodes complete");
        records
    }
}
