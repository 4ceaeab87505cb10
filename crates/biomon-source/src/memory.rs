//! In-process realtime database.
//!
//! Behaves like the hosted database from a listener's point of view:
//! the current value is delivered on subscribe, every write is delivered
//! in order, and a cancelled path drops its listeners after notifying them.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::database::{normalize_path, DataSnapshot, ListenerId, RealtimeDatabase, ValueListener};
use crate::error::{RemoteError, RemoteResult};

struct Registration {
    path: String,
    listener: Arc<dyn ValueListener>,
}

/// In-memory `RealtimeDatabase`.
#[derive(Default)]
pub struct MemoryDatabase {
    values: DashMap<String, Value>,
    listeners: DashMap<ListenerId, Registration>,
    /// Serializes deliveries so listeners see writes in order.
    delivery: Mutex<()>,
    /// When set, `subscribe` fails with this error.
    reject: RwLock<Option<RemoteError>>,
    subscribe_calls: AtomicU64,
    unsubscribe_calls: AtomicU64,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the value at `path` and notify its listeners.
    pub fn set_value(&self, path: &str, value: Value) {
        let path = normalize_path(path);
        let _delivery = self.delivery.lock();

        if value.is_null() {
            self.values.remove(&path);
        } else {
            self.values.insert(path.clone(), value.clone());
        }

        let listeners = self.listeners_for(&path);
        debug!(path = %path, listeners = listeners.len(), "Value set");
        for listener in listeners {
            listener.on_data_change(DataSnapshot::new(path.clone(), value.clone()));
        }
    }

    /// Store a payload string at `path`.
    pub fn set_string(&self, path: &str, payload: impl Into<String>) {
        self.set_value(path, Value::String(payload.into()));
    }

    /// Clear `path`. Listeners receive an empty snapshot.
    pub fn remove(&self, path: &str) {
        self.set_value(path, Value::Null);
    }

    /// Current value at `path`.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.values
            .get(&normalize_path(path))
            .map(|entry| entry.value().clone())
    }

    /// Fail every listener on `path` with `error` and drop them.
    pub fn cancel_path(&self, path: &str, error: RemoteError) {
        let path = normalize_path(path);
        let _delivery = self.delivery.lock();

        let ids: Vec<ListenerId> = self
            .listeners
            .iter()
            .filter(|entry| entry.value().path == path)
            .map(|entry| *entry.key())
            .collect();

        warn!(path = %path, listeners = ids.len(), error = %error, "Cancelling listeners");
        for id in ids {
            if let Some((_, registration)) = self.listeners.remove(&id) {
                registration.listener.on_cancelled(error.clone());
            }
        }
    }

    /// Make subsequent `subscribe` calls fail (`None` restores normal behavior).
    pub fn reject_subscriptions(&self, error: Option<RemoteError>) {
        *self.reject.write() = error;
    }

    /// Number of live listeners on `path`.
    pub fn listener_count(&self, path: &str) -> usize {
        let path = normalize_path(path);
        self.listeners
            .iter()
            .filter(|entry| entry.value().path == path)
            .count()
    }

    /// Total `subscribe` calls (including rejected ones).
    pub fn subscribe_calls(&self) -> u64 {
        self.subscribe_calls.load(Ordering::Relaxed)
    }

    /// Total `unsubscribe` calls.
    pub fn unsubscribe_calls(&self) -> u64 {
        self.unsubscribe_calls.load(Ordering::Relaxed)
    }

    fn listeners_for(&self, path: &str) -> Vec<Arc<dyn ValueListener>> {
        let mut matching: Vec<(ListenerId, Arc<dyn ValueListener>)> = self
            .listeners
            .iter()
            .filter(|entry| entry.value().path == path)
            .map(|entry| (*entry.key(), entry.value().listener.clone()))
            .collect();
        matching.sort_by_key(|(id, _)| *id);
        matching.into_iter().map(|(_, listener)| listener).collect()
    }
}

impl RealtimeDatabase for MemoryDatabase {
    fn subscribe(&self, path: &str, listener: Arc<dyn ValueListener>) -> RemoteResult<ListenerId> {
        self.subscribe_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = self.reject.read().clone() {
            return Err(error);
        }

        let path = normalize_path(path);
        let _delivery = self.delivery.lock();
        let id = ListenerId::next();
        self.listeners.insert(
            id,
            Registration {
                path: path.clone(),
                listener: listener.clone(),
            },
        );

        let current = self.get(&path).unwrap_or(Value::Null);
        debug!(path = %path, listener = %id, "Listener added");
        listener.on_data_change(DataSnapshot::new(path, current));

        Ok(id)
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.unsubscribe_calls.fetch_add(1, Ordering::Relaxed);
        if self.listeners.remove(&id).is_some() {
            debug!(listener = %id, "Listener removed");
        }
    }
}
