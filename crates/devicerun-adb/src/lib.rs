//! Device backend adapter for devicerun
//!
//! The executor only ever talks to a [`DeviceBackend`]: a health probe plus
//! "run this primitive with these arguments under this timeout". [`AdbBackend`]
//! implements it by shelling out to an `adb` executable.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use devicerun_adb::{AdbBackend, DeviceBackend, Primitive};
//!
//! async fn home() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = AdbBackend::new("adb").with_serial("localhost:5555");
//!
//!     if backend.healthcheck(Duration::from_secs(5)).await {
//!         let args = vec!["input".to_string(), "keyevent".to_string(), "3".to_string()];
//!         let out = backend
//!             .execute(Primitive::Shell, &args, Duration::from_secs(5))
//!             .await?;
//!         println!("exit code: {}", out.exit_code);
//!     }
//!     Ok(())
//! }
//! ```

mod adb;
mod backend;
mod error;

pub use adb::AdbBackend;
pub use backend::{CommandOutput, DeviceBackend, Primitive};
pub use error::BackendError;
