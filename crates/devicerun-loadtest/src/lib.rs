//! devicerun load orchestrator
//!
//! Discovers a device pool, runs one worker per device concurrently (never
//! more workers than devices), bounds every worker and the whole test by a
//! timeout, and aggregates the results into a [`devicerun_core::LoadReport`].

pub mod config;
pub mod launcher;
pub mod orchestrator;
pub mod registry;
pub mod report;

pub use config::{LoadPlan, OrchestratorConfig};
pub use launcher::{
    BackendFactory, InProcessLauncher, LaunchError, LaunchOutput, ProcessLauncher, WorkerAssignment,
    WorkerLauncher,
};
pub use orchestrator::{LoadOrchestrator, OrchestratorError};
pub use registry::{DeviceRegistry, RegistryError, StaticRegistry, TunnelManifest};
pub use report::{ReportError, ReportPaths, ReportWriter};
