//! Best-effort secondary sinks for span records.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::record::SpanRecord;

/// A secondary destination for span records.
///
/// `offer` is called after the durable write, on the caller's thread. It must
/// return promptly and must not panic; records it cannot take are dropped.
pub trait SpanSink: Send + Sync {
    fn offer(&self, record: &SpanRecord);
}

/// Mirrors spans to stdout as one structured JSON line each.
///
/// Lines go through a bounded queue drained by a dedicated writer thread, so a
/// slow or closed stdout never stalls the traced work. Dropping the mirror
/// waits a bounded time for queued lines to be written.
pub struct StdoutMirror {
    tx: Option<SyncSender<String>>,
    writer: Option<Writer>,
    dropped: AtomicU64,
}

/// How long dropping a mirror waits for the queue to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

struct Writer {
    handle: JoinHandle<()>,
    /// Disconnects when the writer thread exits.
    done: Mutex<Receiver<()>>,
}

impl StdoutMirror {
    /// Start the writer thread with room for `capacity` pending lines.
    pub fn spawn(capacity: usize) -> Self {
        Self::spawn_to(capacity, io::stdout())
    }

    fn spawn_to<W: Write + Send + 'static>(capacity: usize, mut out: W) -> Self {
        let (tx, rx) = mpsc::sync_channel::<String>(capacity.max(1));
        let (done_tx, done) = mpsc::channel::<()>();
        let spawned = thread::Builder::new()
            .name("span-mirror".to_string())
            .spawn(move || {
                let _done = done_tx;
                for line in rx {
                    if writeln!(out, "{line}").and_then(|_| out.flush()).is_err() {
                        break;
                    }
                }
            });
        let writer = match spawned {
            Ok(handle) => Some(Writer {
                handle,
                done: Mutex::new(done),
            }),
            Err(e) => {
                // Without a writer the queue fills up and every line is dropped.
                warn!(error = %e, "Failed to start span mirror thread");
                None
            }
        };
        Self {
            tx: Some(tx),
            writer,
            dropped: AtomicU64::new(0),
        }
    }

    /// Lines dropped because the queue was full or the writer had stopped.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn mirror_line(record: &SpanRecord) -> Option<String> {
        let mut line = Map::new();
        line.insert("level".to_string(), json!("INFO"));
        line.insert("obs".to_string(), json!("span"));
        if let Ok(Value::Object(fields)) = serde_json::to_value(record) {
            line.extend(fields);
        }
        serde_json::to_string(&Value::Object(line)).ok()
    }
}

impl SpanSink for StdoutMirror {
    fn offer(&self, record: &SpanRecord) {
        let Some(line) = Self::mirror_line(record) else {
            return;
        };
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl Drop for StdoutMirror {
    fn drop(&mut self) {
        // Closing the queue lets the writer finish what is already queued.
        self.tx.take();
        if let Some(writer) = self.writer.take() {
            let done = writer.done.into_inner().unwrap_or_else(|e| e.into_inner());
            match done.recv_timeout(DRAIN_TIMEOUT) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    let _ = writer.handle.join();
                }
                Err(RecvTimeoutError::Timeout) => {
                    debug!("Span mirror writer did not drain in time");
                }
            }
        }
        debug!(dropped = self.dropped(), "Span mirror stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devicerun_core::{RunId, TraceId};
    use std::sync::{Arc, Mutex};

    fn record() -> SpanRecord {
        SpanRecord {
            ts: "2024-01-01T00:00:00Z".to_string(),
            run_id: RunId::new("run_1"),
            trace_id: TraceId::new("abc"),
            span: "episode".to_string(),
            start_ns: 1,
            end_ns: 2,
            dur_ms: 0.0,
            attrs: json!({"task": "tap"}),
            status: "OK".to_string(),
        }
    }

    #[test]
    fn test_mirror_line_shape() {
        let line = StdoutMirror::mirror_line(&record()).unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["obs"], "span");
        assert_eq!(value["run_id"], "run_1");
        assert_eq!(value["attrs"]["task"], "tap");
    }

    #[test]
    fn test_offer_never_blocks_when_writer_is_gone() {
        let (tx, rx) = mpsc::sync_channel::<String>(1);
        drop(rx);
        let mirror = StdoutMirror {
            tx: Some(tx),
            writer: None,
            dropped: AtomicU64::new(0),
        };
        for _ in 0..5 {
            mirror.offer(&record());
        }
        assert_eq!(mirror.dropped(), 5);
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_drop_drains_queued_lines() {
        let buf = SharedBuf::default();
        let mirror = StdoutMirror::spawn_to(64, buf.clone());
        for _ in 0..20 {
            mirror.offer(&record());
        }
        assert_eq!(mirror.dropped(), 0);
        drop(mirror);

        let written = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written.lines().count(), 20);
        assert!(written.lines().all(|l| l.contains("\"obs\":\"span\"")));
    }
}
