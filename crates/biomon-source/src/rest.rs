//! REST event-stream client for a hosted realtime database.
//!
//! Each listener is a long-lived `GET {base_url}/{path}.json` request with
//! `Accept: text/event-stream`. The server answers with:
//! - `put` / `patch`: `{"path": "/...", "data": <json>}`
//! - `keep-alive`: no payload
//! - `cancel`: the listener was rejected (e.g. security rules)
//! - `auth_revoked`: credentials expired
//!
//! A listener never reconnects. Any transport failure or end of stream is
//! reported once through `ValueListener::on_cancelled`.

use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::database::{normalize_path, DataSnapshot, ListenerId, RealtimeDatabase, ValueListener};
use crate::error::{RemoteError, RemoteResult};
use crate::sse::{SseDecoder, SseEvent};

/// Default connect timeout for listener requests.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// REST client configuration.
#[derive(Debug, Clone)]
pub struct RestClientConfig {
    /// Database root URL (e.g. `https://example-rtdb.firebaseio.com`).
    pub base_url: String,
    /// TCP/TLS connect timeout. Streaming bodies have no read timeout.
    pub connect_timeout: Duration,
}

impl RestClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Body of `put` / `patch` events.
#[derive(Debug, Deserialize)]
struct PutEnvelope {
    path: String,
    #[serde(default)]
    data: Value,
}

/// `RealtimeDatabase` over the REST streaming protocol.
pub struct RestStreamingClient {
    client: Client,
    base_url: String,
    runtime: Handle,
    listeners: Mutex<HashMap<ListenerId, CancellationToken>>,
}

impl RestStreamingClient {
    /// Create a client bound to the current tokio runtime.
    pub fn new(config: RestClientConfig) -> RemoteResult<Self> {
        let runtime = Handle::try_current().map_err(|e| RemoteError::NoRuntime(e.to_string()))?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| RemoteError::ConnectionFailed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            runtime,
            listeners: Mutex::new(HashMap::new()),
        })
    }

    /// URL streamed for `path`.
    pub fn path_url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, normalize_path(path))
    }

    /// Number of listener tasks still registered.
    pub fn active_listeners(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl RealtimeDatabase for RestStreamingClient {
    fn subscribe(&self, path: &str, listener: Arc<dyn ValueListener>) -> RemoteResult<ListenerId> {
        let id = ListenerId::next();
        let token = CancellationToken::new();
        let url = self.path_url(path);

        info!(listener = %id, url = %url, "Opening event stream");
        self.listeners.lock().insert(id, token.clone());

        let client = self.client.clone();
        let path = normalize_path(path);
        self.runtime.spawn(async move {
            run_listener(client, url, path, listener, token).await;
        });

        Ok(id)
    }

    fn unsubscribe(&self, id: ListenerId) {
        if let Some(token) = self.listeners.lock().remove(&id) {
            debug!(listener = %id, "Closing event stream");
            token.cancel();
        }
    }
}

impl Drop for RestStreamingClient {
    fn drop(&mut self) {
        for (_, token) in self.listeners.lock().drain() {
            token.cancel();
        }
    }
}

async fn run_listener(
    client: Client,
    url: String,
    path: String,
    listener: Arc<dyn ValueListener>,
    token: CancellationToken,
) {
    tokio::select! {
        _ = token.cancelled() => {
            debug!(path = %path, "Event stream cancelled locally");
        }
        result = stream_events(&client, &url, &path, listener.as_ref()) => {
            let error = match result {
                Ok(()) => RemoteError::Disconnected,
                Err(e) => e,
            };
            if !token.is_cancelled() {
                warn!(path = %path, error = %error, "Event stream terminated");
                listener.on_cancelled(error);
            }
        }
    }
}

/// Pump one event stream into `listener`. Returns `Ok(())` when the body ends.
async fn stream_events(
    client: &Client,
    url: &str,
    path: &str,
    listener: &dyn ValueListener,
) -> RemoteResult<()> {
    let response = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await
        .map_err(|e| RemoteError::ConnectionFailed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RemoteError::Http {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("unknown").to_string(),
        });
    }

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| RemoteError::ConnectionFailed(e.to_string()))?;
        for event in decoder.feed(&chunk)? {
            if let Some(snapshot) = interpret_event(path, &event)? {
                listener.on_data_change(snapshot);
            }
        }
    }

    Ok(())
}

/// Map one protocol event to a snapshot for `path`.
///
/// Only root puts replace the value; a payload path holds a single string
/// so child puts and patches carry nothing usable.
pub(crate) fn interpret_event(path: &str, event: &SseEvent) -> RemoteResult<Option<DataSnapshot>> {
    match event.event.as_str() {
        "put" => match serde_json::from_str::<PutEnvelope>(&event.data) {
            Ok(envelope) if envelope.path == "/" => {
                Ok(Some(DataSnapshot::new(path, envelope.data)))
            }
            Ok(envelope) => {
                debug!(path = %path, child = %envelope.path, "Ignoring child put");
                Ok(None)
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Malformed put event");
                Ok(None)
            }
        },
        "patch" => {
            debug!(path = %path, "Ignoring patch event");
            Ok(None)
        }
        "keep-alive" => {
            trace!(path = %path, "keep-alive");
            Ok(None)
        }
        "cancel" => {
            let reason = match serde_json::from_str::<Value>(&event.data) {
                Ok(Value::String(reason)) => reason,
                _ => "cancelled by server".to_string(),
            };
            Err(RemoteError::Cancelled(reason))
        }
        "auth_revoked" => Err(RemoteError::AuthRevoked),
        other => {
            debug!(path = %path, event = %other, "Ignoring unknown event");
            Ok(None)
        }
    }
}
