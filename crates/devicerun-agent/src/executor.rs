//! Task execution against a device backend.
//!
//! A [`TaskSpec`] is resolved into a [`TaskKind`], checked against a healthy
//! device, then translated into one or more backend primitives. Every failure
//! is folded into the returned [`TaskResult`]; nothing propagates.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use devicerun_adb::{BackendError, CommandOutput, DeviceBackend, Primitive};
use devicerun_core::{
    round_millis, tail, CoreError, ScrollDirection, TaskKind, TaskResult, TaskSpec,
};
use devicerun_trace::Tracer;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;

/// Details reported when the pre-flight healthcheck fails.
pub const BACKEND_UNHEALTHY: &str = "backend not healthy";

/// Something that turns a task into a result. The harness retries through it.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_task(&self, task: &TaskSpec) -> TaskResult;
}

/// Errors raised while driving a primitive, before they become a failed result.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("{source} ({step})")]
    Backend {
        step: String,
        #[source]
        source: BackendError,
    },

    #[error("Failed to write screenshot '{}': {source}", path.display())]
    Screenshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExecutorError {
    fn is_timeout(&self) -> bool {
        matches!(self, Self::Backend { source, .. } if source.is_timeout())
    }
}

/// Outcome of the primitives behind one task.
struct Step {
    ok: bool,
    details: String,
}

/// Executes tasks on one device.
pub struct TaskExecutor {
    backend: Arc<dyn DeviceBackend>,
    tracer: Arc<Tracer>,
    config: ExecutorConfig,
}

impl TaskExecutor {
    pub fn new(
        backend: Arc<dyn DeviceBackend>,
        tracer: Arc<Tracer>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            backend,
            tracer,
            config,
        }
    }

    /// Execute one task. Never fails: errors are reported in the result.
    pub async fn execute(&self, task: &TaskSpec) -> TaskResult {
        let started = Instant::now();
        let mut span = self.tracer.span("task.execute", json!({"task": task.name}));

        let result = match TaskKind::from_spec(task) {
            Ok(kind) => self.execute_kind(&task.name, &kind, started).await,
            Err(e @ CoreError::UnknownTask(_)) => {
                warn!(task = %task.name, "Unknown task requested");
                TaskResult::failed(&task.name, e.to_string(), 0.0)
            }
            Err(e) => {
                warn!(task = %task.name, error = %e, "Invalid task parameters");
                TaskResult::failed(&task.name, e.to_string(), elapsed_secs(started))
            }
        };

        span.set_attr("success", result.success);
        span.set_attr("latency_sec", result.latency_sec);
        span.set_attr("timeout", result.timeout);
        result
    }

    async fn execute_kind(&self, name: &str, kind: &TaskKind, started: Instant) -> TaskResult {
        if !self.backend.healthcheck(self.config.healthcheck_timeout).await {
            warn!(task = %name, "Backend unhealthy, skipping task");
            return TaskResult::failed(name, BACKEND_UNHEALTHY, 0.0);
        }

        debug!(task = %name, primitive = kind.name(), "Dispatching primitive");
        let outcome = self.drive(kind).await;
        let elapsed = started.elapsed();
        let slow = elapsed > self.config.slow_threshold;

        let (success, details, timed_out) = match outcome {
            Ok(step) => (step.ok, step.details, false),
            Err(e) if e.is_timeout() => (false, e.to_string(), true),
            Err(e) => (false, format!("Exception: {e}"), false),
        };

        let result = TaskResult {
            success,
            latency_sec: round_millis(elapsed.as_secs_f64()),
            task: name.to_string(),
            details: tail(&details, kind.detail_limit()),
            timeout: timed_out || slow,
        };
        info!(
            task = %name,
            success = result.success,
            latency_sec = result.latency_sec,
            timeout = result.timeout,
            "Task finished"
        );
        result
    }

    /// Translate a task into backend primitives.
    async fn drive(&self, kind: &TaskKind) -> Result<Step, ExecutorError> {
        if kind.needs_wake() {
            self.wake().await;
        }
        let cfg = &self.config;
        let limit = kind.detail_limit();

        match kind {
            TaskKind::BrowserSearch { query } => {
                let url = format!(
                    "https://www.google.com/search?q={}",
                    urlencoding::encode(query)
                );
                self.view(&url, limit).await
            }
            TaskKind::OpenSettings => {
                self.single(
                    &["am", "start", "-a", "android.settings.SETTINGS"],
                    cfg.launch_timeout,
                    limit,
                )
                .await
            }
            TaskKind::Scroll { direction, count } => self.scroll(*direction, *count).await,
            TaskKind::Screenshot { filename } => self.screenshot(filename, limit).await,
            TaskKind::OpenApp { package, activity } => match activity {
                Some(activity) => {
                    let component = shell_quote(&format!("{package}/{activity}"));
                    self.single(
                        &["am", "start", "-n", &component],
                        cfg.launch_timeout,
                        limit,
                    )
                    .await
                }
                None => {
                    self.single(
                        &[
                            "monkey",
                            "-p",
                            &shell_quote(package),
                            "-c",
                            "android.intent.category.LAUNCHER",
                            "1",
                        ],
                        cfg.launch_timeout,
                        limit,
                    )
                    .await
                }
            },
            TaskKind::OpenUrl { url } => self.view(url, limit).await,
            TaskKind::Tap { x, y } => {
                self.single(
                    &["input", "tap", &x.to_string(), &y.to_string()],
                    cfg.input_timeout,
                    limit,
                )
                .await
            }
            TaskKind::Swipe { x1, y1, x2, y2 } => {
                self.single(
                    &[
                        "input",
                        "swipe",
                        &x1.to_string(),
                        &y1.to_string(),
                        &x2.to_string(),
                        &y2.to_string(),
                    ],
                    cfg.input_timeout,
                    limit,
                )
                .await
            }
            TaskKind::TypeText { text } => {
                // `input text` treats %s as a space.
                let encoded = shell_quote(&text.replace(' ', "%s"));
                self.single(&["input", "text", &encoded], cfg.input_timeout, limit).await
            }
            TaskKind::NavHome => self.keyevent(3, limit).await,
            TaskKind::NavBack => self.keyevent(4, limit).await,
            TaskKind::NavRecents => self.keyevent(187, limit).await,
            TaskKind::OpenNotifications => {
                self.single(
                    &["cmd", "statusbar", "expand-notifications"],
                    cfg.keypress_timeout,
                    limit,
                )
                .await
            }
            TaskKind::Wifi { enabled } => {
                let state = if *enabled { "enable" } else { "disable" };
                self.single(&["svc", "wifi", state], cfg.input_timeout, limit).await
            }
        }
    }

    /// Open a URL with the VIEW intent.
    async fn view(&self, url: &str, limit: usize) -> Result<Step, ExecutorError> {
        self.single(
            &[
                "am",
                "start",
                "-a",
                "android.intent.action.VIEW",
                "-d",
                &shell_quote(url),
            ],
            self.config.launch_timeout,
            limit,
        )
        .await
    }

    async fn keyevent(&self, code: u32, limit: usize) -> Result<Step, ExecutorError> {
        self.single(
            &["input", "keyevent", &code.to_string()],
            self.config.keypress_timeout,
            limit,
        )
        .await
    }

    async fn single(
        &self,
        args: &[&str],
        budget: Duration,
        limit: usize,
    ) -> Result<Step, ExecutorError> {
        let out = self.call(Primitive::Shell, args, budget).await?;
        Ok(Step {
            ok: out.success(),
            details: tail(&out.text(), limit),
        })
    }

    async fn scroll(&self, direction: ScrollDirection, count: u32) -> Result<Step, ExecutorError> {
        let (from_y, to_y) = match direction {
            ScrollDirection::Down => ("1600", "600"),
            ScrollDirection::Up => ("600", "1600"),
        };
        let mut ok = true;
        for step in 0..count {
            let out = self
                .call(
                    Primitive::Shell,
                    &["input", "swipe", "500", from_y, "500", to_y],
                    self.config.input_timeout,
                )
                .await?;
            ok &= out.success();
            if step + 1 < count {
                tokio::time::sleep(self.config.step_pause).await;
            }
        }
        let details = if ok { "scrolled" } else { "scroll failed" };
        Ok(Step {
            ok,
            details: details.to_string(),
        })
    }

    async fn screenshot(&self, filename: &str, limit: usize) -> Result<Step, ExecutorError> {
        let out = self
            .call(Primitive::ExecOut, &["screencap", "-p"], self.config.capture_timeout)
            .await?;
        if !out.success() || out.stdout.is_empty() {
            let details = String::from_utf8_lossy(&out.stderr).into_owned();
            return Ok(Step {
                ok: false,
                details: tail(&details, limit),
            });
        }

        let dir = &self.config.results_dir;
        let path = dir.join(filename);
        let write = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, &out.stdout).await
        };
        write.await.map_err(|source| ExecutorError::Screenshot {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), bytes = out.stdout.len(), "Screenshot saved");
        Ok(Step {
            ok: true,
            details: tail(&format!("saved {}", path.display()), limit),
        })
    }

    /// Best-effort wake and unlock; failures are ignored.
    async fn wake(&self) {
        let budget = self.config.keypress_timeout;
        let steps: [&[&str]; 3] = [
            &["settings", "put", "global", "stay_on_while_plugged_in", "3"],
            &["input", "keyevent", "224"],
            &["input", "keyevent", "82"],
        ];
        for args in steps {
            if let Err(e) = self.call(Primitive::Shell, args, budget).await {
                debug!(error = %e, "Wake step failed");
            }
        }
    }

    async fn call(
        &self,
        primitive: Primitive,
        args: &[&str],
        budget: Duration,
    ) -> Result<CommandOutput, ExecutorError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let step = format!("{} {}", primitive.as_str(), args.join(" "));
        self.tracer
            .in_span(
                "backend.execute",
                json!({
                    "primitive": primitive.as_str(),
                    "args": args,
                    "timeout_sec": budget.as_secs_f64(),
                }),
                self.backend.execute(primitive, &args, budget),
            )
            .await
            .map_err(|source| ExecutorError::Backend { step, source })
    }
}

#[async_trait]
impl TaskRunner for TaskExecutor {
    async fn run_task(&self, task: &TaskSpec) -> TaskResult {
        self.execute(task).await
    }
}

fn elapsed_secs(started: Instant) -> f64 {
    round_millis(started.elapsed().as_secs_f64())
}

/// Quote an argument for the device shell, which re-splits `adb shell` input.
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
