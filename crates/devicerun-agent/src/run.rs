//! One agent run: plan, execute episodes, record.

use std::sync::Arc;

use devicerun_adb::DeviceBackend;
use devicerun_core::{EpisodeRecord, RunId};
use devicerun_trace::{TraceError, Tracer};
use thiserror::Error;
use tracing::info;

use crate::config::AgentConfig;
use crate::executor::TaskExecutor;
use crate::harness::EpisodeHarness;
use crate::planner;
use crate::records::{RecordError, RunArtifacts, RunRecorder};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Trace log error: {0}")]
    Trace(#[from] TraceError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),
}

/// What a finished run produced.
#[derive(Debug)]
pub struct AgentRun {
    pub run_id: RunId,
    pub records: Vec<EpisodeRecord>,
    pub artifacts: Option<RunArtifacts>,
}

/// Plan `config.prompt` once and run `config.episodes` episodes of it on `backend`.
pub async fn run_agent<F>(
    config: &AgentConfig,
    backend: Arc<dyn DeviceBackend>,
    on_episode: F,
) -> Result<AgentRun, AgentError>
where
    F: FnMut(&EpisodeRecord) + Send,
{
    let run_id = config
        .run_id
        .clone()
        .map(RunId::from)
        .unwrap_or_else(RunId::now);
    let tracer = Arc::new(Tracer::open(&config.trace, run_id.clone(), None)?);
    let task = planner::plan(&config.prompt);

    info!(
        run_id = %run_id,
        trace_id = %tracer.trace_id(),
        task = %task.name,
        episodes = config.episodes,
        max_retries = config.max_retries,
        "Starting run"
    );

    let executor = TaskExecutor::new(backend, tracer.clone(), config.executor.clone());
    let harness = EpisodeHarness::new(Arc::new(executor), tracer, config.harness.clone());
    let records = harness
        .run_many(&run_id, &task, config.episodes, config.max_retries, on_episode)
        .await;

    let artifacts = if config.write_records {
        let recorder = RunRecorder::new(&config.executor.results_dir);
        Some(recorder.write(&run_id, &records)?)
    } else {
        None
    };

    Ok(AgentRun {
        run_id,
        records,
        artifacts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use devicerun_adb::{BackendError, CommandOutput, Primitive};
    use devicerun_trace::{read_spans, TraceConfig};
    use std::time::Duration;

    struct HealthyBackend;

    #[async_trait]
    impl DeviceBackend for HealthyBackend {
        async fn healthcheck(&self, _timeout: Duration) -> bool {
            true
        }

        async fn execute(
            &self,
            _primitive: Primitive,
            _args: &[String],
            _timeout: Duration,
        ) -> Result<CommandOutput, BackendError> {
            Ok(CommandOutput::default())
        }
    }

    #[tokio::test]
    async fn test_run_agent_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AgentConfig {
            episodes: 2,
            prompt: "go home".to_string(),
            run_id: Some("run_e2e".to_string()),
            trace: TraceConfig::new(dir.path().join("obs")).with_mirror_stdout(false),
            ..AgentConfig::default()
        };
        config.executor.results_dir = dir.path().join("results");

        let mut seen = 0;
        let run = run_agent(&config, Arc::new(HealthyBackend), |_| seen += 1)
            .await
            .unwrap();

        assert_eq!(seen, 2);
        assert_eq!(run.run_id.as_str(), "run_e2e");
        assert!(run.records.iter().all(|r| r.result.success && r.result.task == "nav_home"));

        let artifacts = run.artifacts.unwrap();
        assert!(artifacts.csv.exists());
        assert!(artifacts.html.exists());

        let spans = read_spans(&config.trace.path_for(&run.run_id)).unwrap();
        assert!(spans.iter().any(|s| s.span == "backend.execute"));
        assert_eq!(spans.iter().filter(|s| s.span == "episode").count(), 2);
    }

    #[tokio::test]
    async fn test_records_can_be_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AgentConfig {
            episodes: 1,
            prompt: "back".to_string(),
            write_records: false,
            trace: TraceConfig::new(dir.path()).with_mirror_stdout(false),
            ..AgentConfig::default()
        };
        config.executor.results_dir = dir.path().join("results");

        let run = run_agent(&config, Arc::new(HealthyBackend), |_| {}).await.unwrap();
        assert!(run.artifacts.is_none());
        assert!(!dir.path().join("results").exists());
    }
}
