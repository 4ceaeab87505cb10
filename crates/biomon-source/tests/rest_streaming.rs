//! RestStreamingClient against a local event-stream server.

use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use biomon_source::{
    DataSnapshot, RealtimeDatabase, RemoteError, RestClientConfig, RestStreamingClient,
    ValueListener,
};
use futures_util::stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Debug)]
enum Notification {
    Data(Value),
    Cancelled(RemoteError),
}

struct ChannelListener {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ValueListener for ChannelListener {
    fn on_data_change(&self, snapshot: DataSnapshot) {
        let _ = self.tx.send(Notification::Data(snapshot.value().clone()));
    }

    fn on_cancelled(&self, error: RemoteError) {
        let _ = self.tx.send(Notification::Cancelled(error));
    }
}

fn put(data: Value) -> Event {
    Event::default()
        .event("put")
        .data(json!({"path": "/", "data": data}).to_string())
}

async fn finite_stream() -> impl IntoResponse {
    let events = vec![
        put(Value::Null),
        Event::default().event("keep-alive").data("null"),
        put(json!("{\"value\":72,\"timestamp\":2000}")),
    ];
    Sse::new(stream::iter(events.into_iter().map(Ok::<_, Infallible>)))
}

async fn cancelled_stream() -> impl IntoResponse {
    let events = vec![
        put(json!("{\"data\":[1],\"timestamp\":1}")),
        Event::default().event("cancel").data("\"Permission denied\""),
    ];
    Sse::new(stream::iter(events.into_iter().map(Ok::<_, Infallible>)))
}

async fn unauthorized() -> impl IntoResponse {
    StatusCode::UNAUTHORIZED
}

async fn serve() -> String {
    let app = Router::new()
        .route("/heartrate/latest.json", get(finite_stream))
        .route("/ecg/latest.json", get(cancelled_stream))
        .route("/emg/latest.json", get(unauthorized));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Notification {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no notification")
        .expect("listener dropped")
}

fn listener() -> (Arc<ChannelListener>, mpsc::UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelListener { tx }), rx)
}

#[tokio::test]
async fn test_puts_delivered_then_end_of_stream_reported() {
    let base = serve().await;
    let client = RestStreamingClient::new(RestClientConfig::new(base)).unwrap();
    let (listener, mut rx) = listener();

    client.subscribe("heartrate/latest", listener).unwrap();

    assert!(matches!(recv(&mut rx).await, Notification::Data(Value::Null)));
    match recv(&mut rx).await {
        Notification::Data(value) => {
            assert_eq!(value, json!("{\"value\":72,\"timestamp\":2000}"))
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        recv(&mut rx).await,
        Notification::Cancelled(RemoteError::Disconnected)
    ));
}

#[tokio::test]
async fn test_cancel_event_terminates_listener() {
    let base = serve().await;
    let client = RestStreamingClient::new(RestClientConfig::new(base)).unwrap();
    let (listener, mut rx) = listener();

    client.subscribe("/ecg/latest", listener).unwrap();

    assert!(matches!(recv(&mut rx).await, Notification::Data(_)));
    match recv(&mut rx).await {
        Notification::Cancelled(error) => {
            assert_eq!(error, RemoteError::Cancelled("Permission denied".to_string()))
        }
        other => panic!("unexpected {other:?}"),
    }
    // one terminal notification only
    assert!(timeout(Duration::from_millis(200), rx.recv())
        .await
        .map(|n| n.is_none())
        .unwrap_or(true));
}

#[tokio::test]
async fn test_http_error_status_reported() {
    let base = serve().await;
    let client = RestStreamingClient::new(RestClientConfig::new(base)).unwrap();
    let (listener, mut rx) = listener();

    client.subscribe("emg/latest", listener).unwrap();

    match recv(&mut rx).await {
        Notification::Cancelled(RemoteError::Http { status, .. }) => assert_eq!(status, 401),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_unsubscribe_suppresses_notifications() {
    let base = serve().await;
    let client = RestStreamingClient::new(RestClientConfig::new(base)).unwrap();
    let (listener, mut rx) = listener();

    let id = client.subscribe("emg/latest", listener).unwrap();
    assert_eq!(client.active_listeners(), 1);
    client.unsubscribe(id);
    assert_eq!(client.active_listeners(), 0);

    // the task ends without reporting, dropping its sender
    let next = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert!(next.is_none());
}
