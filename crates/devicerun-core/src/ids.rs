//! Newtype wrappers for identifiers to ensure type safety.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create the identifier from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the inner string reference.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_id!(
    /// Groups every episode and span of one harness execution.
    ///
    /// Also names the output files (`results/<run_id>.json`,
    /// `trace_<run_id>.jsonl`), so it must stay filesystem safe.
    RunId
);

string_id!(
    /// Correlates all spans emitted during one run.
    TraceId
);

string_id!(
    /// Device endpoint as understood by the backend, e.g. `localhost:5555`.
    DeviceId
);

impl RunId {
    /// Build the conventional `run_<unix seconds>` identifier.
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self(format!("run_{}", at.timestamp()))
    }

    /// Identifier for the current second.
    pub fn now() -> Self {
        Self::from_timestamp(Utc::now())
    }

    /// Identifier for a whole load test.
    pub fn for_load_test(load_test_ts: i64) -> Self {
        Self(format!("load_{load_test_ts}"))
    }

    /// Identifier for one load-test worker, unique within the load test.
    pub fn for_worker(load_test_ts: i64, worker_index: usize) -> Self {
        Self(format!("load_{load_test_ts}_w{worker_index}"))
    }
}

impl TraceId {
    /// Generate a new random TraceId (32 hex characters).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_trace_id_generate() {
        let id1 = TraceId::generate();
        let id2 = TraceId::generate();
        assert_ne!(id1, id2);
        assert_eq!(id1.as_str().len(), 32);
        assert!(id1.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_run_id_from_timestamp() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(RunId::from_timestamp(at).as_str(), "run_1700000000");
    }

    #[test]
    fn test_worker_run_ids_are_distinct() {
        let a = RunId::for_worker(1_700_000_000, 0);
        let b = RunId::for_worker(1_700_000_000, 1);
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "load_1700000000_w0");
        assert_ne!(RunId::for_load_test(1_700_000_000), a);
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let id = DeviceId::new("localhost:5555");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"localhost:5555\"");
    }
}
