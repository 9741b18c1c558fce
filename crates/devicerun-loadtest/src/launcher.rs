//! Worker launchers: how one worker's episodes actually get run.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use devicerun_adb::{AdbBackend, DeviceBackend};
use devicerun_agent::{run_agent, AgentConfig};
use devicerun_core::status::RETURN_CODE_CRASHED;
use devicerun_core::{DeviceId, RunId};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Retries each worker gets per episode.
pub const WORKER_RETRIES: u32 = 1;

/// One worker's share of the load test.
#[derive(Debug, Clone)]
pub struct WorkerAssignment {
    pub worker_index: usize,
    pub device: DeviceId,
    pub episodes: u32,
    pub prompt: String,
    pub run_id: RunId,
}

/// What a worker produced when it ran to exit.
#[derive(Debug, Clone, Default)]
pub struct LaunchOutput {
    pub return_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Failed to spawn '{}': {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Agent error: {0}")]
    Agent(String),
}

/// Runs a worker to completion.
///
/// The returned future may be dropped at any time (worker or global timeout);
/// implementations must release the device when that happens.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, assignment: WorkerAssignment) -> Result<LaunchOutput, LaunchError>;
}

/// Runs each worker as a `devicerun-agent` child process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    /// Path to the agent executable.
    agent_path: PathBuf,

    /// Arguments appended to every invocation.
    extra_args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(agent_path: impl Into<PathBuf>) -> Self {
        Self {
            agent_path: agent_path.into(),
            extra_args: Vec::new(),
        }
    }

    /// Append an argument to every agent invocation.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    fn command_args(&self, assignment: &WorkerAssignment) -> Vec<String> {
        let mut args = vec![
            "--serial".to_string(),
            assignment.device.to_string(),
            "--episodes".to_string(),
            assignment.episodes.to_string(),
            "--prompt".to_string(),
            assignment.prompt.clone(),
            "--retries".to_string(),
            WORKER_RETRIES.to_string(),
            "--run-id".to_string(),
            assignment.run_id.to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, assignment: WorkerAssignment) -> Result<LaunchOutput, LaunchError> {
        let args = self.command_args(&assignment);
        info!(
            worker = assignment.worker_index,
            serial = %assignment.device,
            episodes = assignment.episodes,
            "Starting worker process"
        );

        let child = Command::new(&self.agent_path)
            .args(&args)
            .env("ANDROID_SERIAL", assignment.device.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.agent_path.clone(),
                source,
            })?;

        let output = child.wait_with_output().await?;
        let return_code = output.status.code().unwrap_or(RETURN_CODE_CRASHED);
        debug!(worker = assignment.worker_index, return_code, "Worker process exited");

        Ok(LaunchOutput {
            return_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Builds the backend a worker drives for its device.
pub type BackendFactory = Arc<dyn Fn(&DeviceId) -> Arc<dyn DeviceBackend> + Send + Sync>;

/// Runs each worker's episodes on the orchestrator's runtime.
pub struct InProcessLauncher {
    factory: BackendFactory,
    template: AgentConfig,
}

impl InProcessLauncher {
    /// `template` supplies everything but the per-worker fields.
    pub fn new(factory: BackendFactory, template: AgentConfig) -> Self {
        Self { factory, template }
    }

    /// Drive each worker's device through the adb at `template.adb_path`.
    pub fn adb(template: AgentConfig) -> Self {
        let adb_path = template.adb_path.clone();
        let factory: BackendFactory = Arc::new(move |device: &DeviceId| -> Arc<dyn DeviceBackend> {
            Arc::new(
                AdbBackend::new(adb_path.clone())
                    .with_serial(device.clone())
                    .with_env("ANDROID_SERIAL", device.as_str()),
            )
        });
        Self::new(factory, template)
    }
}

#[async_trait]
impl WorkerLauncher for InProcessLauncher {
    async fn launch(&self, assignment: WorkerAssignment) -> Result<LaunchOutput, LaunchError> {
        let config = AgentConfig {
            serial: Some(assignment.device.to_string()),
            episodes: assignment.episodes as usize,
            prompt: assignment.prompt.clone(),
            max_retries: WORKER_RETRIES,
            run_id: Some(assignment.run_id.to_string()),
            ..self.template.clone()
        };
        let backend = (self.factory)(&assignment.device);

        let mut lines = Vec::new();
        let run = run_agent(&config, backend, |record| {
            lines.push(record.result.summary_line(record.episode));
        })
        .await
        .map_err(|e| LaunchError::Agent(e.to_string()))?;

        debug!(
            worker = assignment.worker_index,
            run_id = %run.run_id,
            episodes = run.records.len(),
            "In-process worker finished"
        );
        let mut stdout = lines.join("\n");
        stdout.push('\n');
        Ok(LaunchOutput {
            return_code: 0,
            stdout,
            stderr: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devicerun_adb::{BackendError, CommandOutput, Primitive};
    use devicerun_trace::TraceConfig;
    use std::time::Duration;

    fn assignment(index: usize) -> WorkerAssignment {
        WorkerAssignment {
            worker_index: index,
            device: DeviceId::new("localhost:5555"),
            episodes: 2,
            prompt: "go home".to_string(),
            run_id: RunId::for_worker(1_700_000_000, index),
        }
    }

    #[test]
    fn test_command_args() {
        let launcher = ProcessLauncher::new("devicerun-agent").with_arg("--no-span-mirror");
        let args = launcher.command_args(&assignment(1));
        assert_eq!(
            args,
            vec![
                "--serial",
                "localhost:5555",
                "--episodes",
                "2",
                "--prompt",
                "go home",
                "--retries",
                "1",
                "--run-id",
                "load_1700000000_w1",
                "--no-span-mirror",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_agent_binary() {
        let err = ProcessLauncher::new("/nonexistent/devicerun-agent")
            .launch(assignment(0))
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_output_captured() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent");
        std::fs::write(
            &path,
            "#!/bin/sh\n\
             echo \"[episode 0] success=True serial=$ANDROID_SERIAL\"\n\
             echo warn >&2\n\
             exit 0\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let out = ProcessLauncher::new(&path).launch(assignment(0)).await.unwrap();
        assert_eq!(out.return_code, 0);
        assert_eq!(out.stdout.trim(), "[episode 0] success=True serial=localhost:5555");
        assert_eq!(out.stderr.trim(), "warn");
    }

    struct HomeScreen;

    #[async_trait]
    impl DeviceBackend for HomeScreen {
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
    async fn test_in_process_emits_episode_lines() {
        let dir = tempfile::tempdir().unwrap();
        let template = AgentConfig {
            write_records: false,
            trace: TraceConfig::new(dir.path()).with_mirror_stdout(false),
            ..AgentConfig::default()
        };
        let factory: BackendFactory = Arc::new(|_device: &DeviceId| -> Arc<dyn DeviceBackend> {
            Arc::new(HomeScreen)
        });
        let launcher = InProcessLauncher::new(factory, template);

        let out = launcher.launch(assignment(3)).await.unwrap();
        assert_eq!(out.return_code, 0);
        let lines: Vec<&str> = out.stdout.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("[episode 1] success=true"));
        assert!(dir.path().join("trace_load_1700000000_w3.jsonl").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_in_process_adb_uses_template_path() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let adb = dir.path().join("fake-adb");
        std::fs::write(
            &adb,
            format!(
                "#!/bin/sh\n\
                 echo \"$ANDROID_SERIAL $*\" >> '{}'\n\
                 case \"$*\" in *get-state*) echo device ;; esac\n\
                 exit 0\n",
                log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&adb, std::fs::Permissions::from_mode(0o755)).unwrap();

        let template = AgentConfig {
            adb_path: adb.to_string_lossy().into_owned(),
            write_records: false,
            trace: TraceConfig::new(dir.path()).with_mirror_stdout(false),
            ..AgentConfig::default()
        };
        let out = InProcessLauncher::adb(template)
            .launch(assignment(0))
            .await
            .unwrap();

        assert_eq!(out.stdout.lines().count(), 2);
        assert!(out.stdout.lines().all(|l| l.contains("success=true")), "{}", out.stdout);
        let calls = std::fs::read_to_string(&log).unwrap();
        assert!(calls.contains("localhost:5555 -s localhost:5555 shell input keyevent 3"));
    }
}
