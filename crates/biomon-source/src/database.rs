//! Realtime database capability consumed by stream sources.

use biomon_core::{payload_str, DecodeResult};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{RemoteError, RemoteResult};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocate a process-unique listener id.
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Value held at a path when a change notification fires.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSnapshot {
    path: String,
    value: Value,
}

impl DataSnapshot {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Whether the path holds anything.
    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    /// Payload string stored at the path (`None` when the path is empty).
    pub fn payload(&self) -> DecodeResult<Option<&str>> {
        payload_str(&self.value)
    }
}

/// Callback object receiving notifications for one path.
///
/// Called from the database client's delivery context. Implementations
/// must not block and must not call back into the database.
pub trait ValueListener: Send + Sync {
    /// The value at the path was set (also fired once on subscribe).
    fn on_data_change(&self, snapshot: DataSnapshot);

    /// The listener failed. No further notifications follow.
    fn on_cancelled(&self, error: RemoteError);
}

/// Observe-path capability of a realtime database client.
pub trait RealtimeDatabase: Send + Sync {
    /// Register `listener` for value changes at `path`.
    fn subscribe(&self, path: &str, listener: Arc<dyn ValueListener>) -> RemoteResult<ListenerId>;

    /// Remove a listener. Unknown ids are ignored.
    fn unsubscribe(&self, id: ListenerId);
}

/// Strip leading/trailing slashes so `/ecg/latest/` and `ecg/latest` match.
pub fn normalize_path(path: &str) -> String {
    path.trim_matches('/').to_string()
}
