//! devicerun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Device backends or subprocesses
//! - Filesystem output
//! - Runtime specifics
//!
//! Everything produced by the executor, the episode harness and the load
//! orchestrator is modelled here so reports can be built from data alone.

pub mod episode;
pub mod error;
pub mod ids;
pub mod report;
pub mod status;
pub mod task;
pub mod text;
pub mod worker;

// Re-export commonly used types
pub use episode::{EpisodeRecord, EpisodeResult};
pub use error::CoreError;
pub use ids::{DeviceId, RunId, TraceId};
pub use report::{LoadReport, LoadSummary, LoadTestConfig};
pub use status::WorkerOutcome;
pub use task::{ScrollDirection, TaskKind, TaskResult, TaskSpec};
pub use text::{round_millis, tail};
pub use worker::WorkerResult;
