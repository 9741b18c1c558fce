//! Correlation tracer for devicerun.
//!
//! Every executor call, episode and load-test worker can be wrapped in a span.
//! Spans land in an append-only JSON lines file, one per run id, and are
//! mirrored best-effort to a secondary sink for live ingestion.
//!
//! # Example
//!
//! ```rust,no_run
//! use devicerun_core::RunId;
//! use devicerun_trace::{TraceConfig, Tracer};
//! use serde_json::json;
//!
//! fn traced() -> Result<(), Box<dyn std::error::Error>> {
//!     let tracer = Tracer::open(&TraceConfig::default(), RunId::now(), None)?;
//!     let mut span = tracer.span("episode", json!({"task": "tap"}));
//!     span.set_attr("attempts", 1);
//!     drop(span); // record appended here
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod mirror;
mod record;
mod tracer;

pub use config::TraceConfig;
pub use error::TraceError;
pub use mirror::{SpanSink, StdoutMirror};
pub use record::{read_spans, SpanRecord, STATUS_OK};
pub use tracer::{SpanGuard, Tracer};
