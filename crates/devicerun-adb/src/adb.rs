//! `adb` subprocess backend.
//!
//! Each primitive spawns `adb [-s <serial>] <shell|exec-out> <args...>`. The
//! child is killed when its call times out or the calling task is aborted.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use devicerun_core::DeviceId;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::backend::{CommandOutput, DeviceBackend, Primitive};
use crate::error::BackendError;

/// Drives one device through the `adb` executable.
#[derive(Debug, Clone)]
pub struct AdbBackend {
    /// Path to the adb executable.
    adb_path: String,

    /// Target device; `None` lets adb pick its default device.
    serial: Option<DeviceId>,

    /// Additional environment variables.
    env_vars: Vec<(String, String)>,
}

impl AdbBackend {
    /// Create a backend using the given adb executable.
    ///
    /// The path can be just "adb" to use PATH lookup, or a full path.
    pub fn new(adb_path: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
            serial: None,
            env_vars: Vec::new(),
        }
    }

    /// Bind the backend to a device serial.
    pub fn with_serial(mut self, serial: impl Into<DeviceId>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    pub fn serial(&self) -> Option<&DeviceId> {
        self.serial.as_ref()
    }

    fn command_args(&self, head: &str, args: &[String]) -> Vec<String> {
        let mut all = Vec::with_capacity(args.len() + 3);
        if let Some(serial) = &self.serial {
            all.push("-s".to_string());
            all.push(serial.to_string());
        }
        all.push(head.to_string());
        all.extend(args.iter().cloned());
        all
    }

    async fn run(
        &self,
        args: Vec<String>,
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        let mut cmd = Command::new(&self.adb_path);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        debug!(
            adb = %self.adb_path,
            args = ?args,
            timeout_ms = timeout.as_millis() as u64,
            "Spawning adb"
        );

        let child = cmd.spawn().map_err(|source| BackendError::Spawn {
            program: self.adb_path.clone(),
            source,
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(adb = %self.adb_path, args = ?args, "adb call timed out");
                return Err(BackendError::Timeout(timeout));
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        debug!(exit_code, stdout_len = output.stdout.len(), "adb exited");
        Ok(CommandOutput {
            exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

impl Default for AdbBackend {
    fn default() -> Self {
        Self::new("adb")
    }
}

#[async_trait]
impl DeviceBackend for AdbBackend {
    async fn healthcheck(&self, timeout: Duration) -> bool {
        match self.run(self.command_args("get-state", &[]), timeout).await {
            Ok(out) => {
                let state = String::from_utf8_lossy(&out.stdout).trim().to_string();
                let healthy = out.success() && state == "device";
                if !healthy {
                    warn!(
                        serial = ?self.serial,
                        state = %state,
                        exit_code = out.exit_code,
                        "Device not ready"
                    );
                }
                healthy
            }
            Err(e) => {
                warn!(serial = ?self.serial, error = %e, "Healthcheck failed");
                false
            }
        }
    }

    async fn execute(
        &self,
        primitive: Primitive,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError> {
        self.run(self.command_args(primitive.as_str(), args), timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_command_args_with_serial() {
        let backend = AdbBackend::new("adb").with_serial("localhost:5555");
        assert_eq!(
            backend.command_args("shell", &args(&["input", "tap", "1", "2"])),
            args(&["-s", "localhost:5555", "shell", "input", "tap", "1", "2"])
        );
    }

    #[test]
    fn test_command_args_without_serial() {
        let backend = AdbBackend::default();
        assert_eq!(
            backend.command_args("exec-out", &args(&["screencap", "-p"])),
            args(&["exec-out", "screencap", "-p"])
        );
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let backend = AdbBackend::new("/nonexistent/devicerun-adb");
        let err = backend
            .execute(Primitive::Shell, &args(&["true"]), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));
        assert!(!backend.healthcheck(Duration::from_secs(1)).await);
    }

    #[cfg(unix)]
    mod fake_adb {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::{Path, PathBuf};

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("adb");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_exit_code_and_output() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(dir.path(), "echo \"args: $*\"; echo oops >&2; exit 3");
            let backend = AdbBackend::new(path.to_string_lossy()).with_serial("emu-1");
            let out = backend
                .execute(
                    Primitive::Shell,
                    &args(&["input", "keyevent", "4"]),
                    Duration::from_secs(5),
                )
                .await
                .unwrap();
            assert_eq!(out.exit_code, 3);
            assert_eq!(
                String::from_utf8_lossy(&out.stdout).trim(),
                "args: -s emu-1 shell input keyevent 4"
            );
            assert!(out.text().contains("oops"));
        }

        #[tokio::test]
        async fn test_timeout_is_distinct() {
            let dir = tempfile::tempdir().unwrap();
            let path = script(dir.path(), "sleep 5");
            let backend = AdbBackend::new(path.to_string_lossy());
            let err = backend
                .execute(Primitive::Shell, &[], Duration::from_millis(100))
                .await
                .unwrap_err();
            assert!(err.is_timeout());
        }

        #[tokio::test]
        async fn test_healthcheck_requires_device_state() {
            let dir = tempfile::tempdir().unwrap();
            let ready = script(dir.path(), "echo device");
            assert!(AdbBackend::new(ready.to_string_lossy())
                .healthcheck(Duration::from_secs(5))
                .await);

            let dir = tempfile::tempdir().unwrap();
            let offline = script(dir.path(), "echo offline");
            assert!(!AdbBackend::new(offline.to_string_lossy())
                .healthcheck(Duration::from_secs(5))
                .await);
        }
    }
}
