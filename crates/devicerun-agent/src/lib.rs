//! devicerun agent
//!
//! Plans a prompt into a task, executes it on one device with bounded retries
//! and records what happened:
//!
//! - [`planner`] turns a prompt into a [`devicerun_core::TaskSpec`]
//! - [`executor`] drives the task through a [`devicerun_adb::DeviceBackend`]
//! - [`harness`] retries failed attempts and flags flaky episodes
//! - [`records`] writes JSON, CSV, markdown and HTML summaries
//!
//! [`run_agent`] wires all of them together for one run.

pub mod config;
pub mod executor;
pub mod harness;
pub mod planner;
pub mod records;
mod run;

pub use config::{AgentConfig, ExecutorConfig, HarnessConfig};
pub use executor::{TaskExecutor, TaskRunner};
pub use harness::EpisodeHarness;
pub use records::{RecordError, RunArtifacts, RunMetrics, RunRecorder};
pub use run::{run_agent, AgentError, AgentRun};
