//! The tracer and its scoped span guard.

use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use devicerun_core::{round_millis, RunId, TraceId};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::TraceConfig;
use crate::error::TraceError;
use crate::mirror::{SpanSink, StdoutMirror};
use crate::record::{SpanRecord, STATUS_OK};

/// Appends span records for one run.
///
/// Shared between concurrent episodes through an `Arc`; each append holds the
/// file mutex for the whole line so records never interleave.
pub struct Tracer {
    run_id: RunId,
    trace_id: TraceId,
    path: Option<PathBuf>,
    log: Mutex<Option<File>>,
    mirror: Option<Arc<dyn SpanSink>>,
}

impl Tracer {
    /// Open (or create) `trace_<run_id>.jsonl` under the configured directory.
    pub fn open(
        config: &TraceConfig,
        run_id: RunId,
        trace_id: Option<TraceId>,
    ) -> Result<Self, TraceError> {
        std::fs::create_dir_all(&config.dir).map_err(|source| TraceError::Open {
            path: config.dir.clone(),
            source,
        })?;
        let path = config.path_for(&run_id);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| TraceError::Open {
                path: path.clone(),
                source,
            })?;

        let mirror: Option<Arc<dyn SpanSink>> = if config.mirror_stdout {
            Some(Arc::new(StdoutMirror::spawn(config.mirror_capacity)))
        } else {
            None
        };

        debug!(path = %path.display(), run_id = %run_id, "Opened trace log");
        Ok(Self {
            run_id,
            trace_id: trace_id.unwrap_or_else(TraceId::generate),
            path: Some(path),
            log: Mutex::new(Some(file)),
            mirror,
        })
    }

    /// A tracer that keeps nothing. Spans still time and propagate errors.
    pub fn discard(run_id: RunId) -> Self {
        Self {
            run_id,
            trace_id: TraceId::generate(),
            path: None,
            log: Mutex::new(None),
            mirror: None,
        }
    }

    /// Replace the secondary sink.
    pub fn with_mirror(mut self, mirror: Arc<dyn SpanSink>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// Trace log path, if this tracer writes one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Open a span. The record is appended when the guard drops.
    ///
    /// `attrs` should be a JSON object; anything else is stored under `value`.
    pub fn span(&self, name: impl Into<String>, attrs: Value) -> SpanGuard<'_> {
        let attrs = match attrs {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        SpanGuard {
            tracer: self,
            name: name.into(),
            attrs,
            start_ns: now_ns(),
            started: Instant::now(),
            status: None,
        }
    }

    /// Run `work` inside a span.
    ///
    /// An `Err` marks the span `ERROR:<msg>` and is returned unchanged. If the
    /// future is dropped before finishing, the span is marked cancelled.
    pub async fn in_span<F, T, E>(
        &self,
        name: impl Into<String>,
        attrs: Value,
        work: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut guard = self.span(name, attrs);
        guard.fail("cancelled");
        let result = work.await;
        match &result {
            Ok(_) => guard.succeed(),
            Err(e) => guard.fail(e.to_string()),
        }
        result
    }

    fn append(&self, record: &SpanRecord) {
        match serde_json::to_string(record) {
            Ok(mut line) => {
                line.push('\n');
                let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(file) = log.as_mut() {
                    if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
                        warn!(error = %e, span = %record.span, "Failed to append span");
                    }
                }
            }
            Err(e) => warn!(error = %e, span = %record.span, "Failed to serialize span"),
        }

        if let Some(mirror) = &self.mirror {
            mirror.offer(record);
        }
    }
}

/// Scoped handle for an open span.
pub struct SpanGuard<'a> {
    tracer: &'a Tracer,
    name: String,
    attrs: Map<String, Value>,
    start_ns: i64,
    started: Instant,
    status: Option<Result<(), String>>,
}

impl SpanGuard<'_> {
    /// Attach or overwrite an attribute.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attrs.insert(key.into(), value.into());
    }

    /// Mark the wrapped work as failed.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = Some(Err(message.into()));
    }

    /// Mark the wrapped work as succeeded, clearing an earlier failure.
    pub fn succeed(&mut self) {
        self.status = Some(Ok(()));
    }
}

impl Drop for SpanGuard<'_> {
    fn drop(&mut self) {
        let elapsed_ns = i64::try_from(self.started.elapsed().as_nanos()).unwrap_or(i64::MAX);
        let end_ns = self.start_ns.saturating_add(elapsed_ns);
        let status = match self.status.take() {
            Some(Ok(())) => STATUS_OK.to_string(),
            Some(Err(msg)) => format!("ERROR:{msg}"),
            None if std::thread::panicking() => "ERROR:panicked".to_string(),
            None => STATUS_OK.to_string(),
        };
        let record = SpanRecord {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            run_id: self.tracer.run_id.clone(),
            trace_id: self.tracer.trace_id.clone(),
            span: std::mem::take(&mut self.name),
            start_ns: self.start_ns,
            end_ns,
            dur_ms: round_millis((end_ns - self.start_ns) as f64 / 1e6),
            attrs: Value::Object(std::mem::take(&mut self.attrs)),
            status,
        };
        self.tracer.append(&record);
    }
}

fn now_ns() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}
