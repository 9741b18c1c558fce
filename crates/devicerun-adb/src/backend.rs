//! The backend capability the executor depends on.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::BackendError;

/// How a primitive's arguments are delivered to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    /// Run a shell command on the device; output is text.
    Shell,
    /// Run a command and stream its raw stdout back; output is binary-safe.
    ExecOut,
}

impl Primitive {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::ExecOut => "exec-out",
        }
    }
}

/// Result of a primitive that ran to exit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code, `-1` if terminated by a signal.
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Exit code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr, lossily decoded.
    pub fn text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text
    }
}

/// A device that can be probed and driven.
///
/// Implementations must be safe to share across tasks; one instance is bound
/// to exactly one device.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Whether the device is reachable and ready, decided within `timeout`.
    async fn healthcheck(&self, timeout: Duration) -> bool;

    /// Run one primitive. Exceeding `timeout` yields [`BackendError::Timeout`].
    async fn execute(
        &self,
        primitive: Primitive,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, BackendError>;
}
