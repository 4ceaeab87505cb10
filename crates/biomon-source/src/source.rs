//! Per-channel stream sources.
//!
//! A `StreamSource` owns at most one remote listener for its channel's path.
//! The listener decodes every notification synchronously and publishes the
//! result into a watch channel shared by all attached consumers.
//!
//! Lifecycle: Unsubscribed → Subscribed → (Receiving | Cancelled) → Unsubscribed.
//! - the first `attach()` registers the listener
//! - empty notifications and decode failures are counted and skipped
//! - a remote failure is published once as a terminal error
//! - the listener is removed exactly once, when the last consumer detaches

use biomon_core::{Channel, ChannelSample, EcgSample, EmgSample, HeartRateSample};
use futures_util::Stream;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};

use crate::database::{DataSnapshot, ListenerId, RealtimeDatabase, ValueListener};
use crate::error::{RemoteError, SourceError, SourceResult};

pub type EcgSource = StreamSource<EcgSample>;
pub type EmgSource = StreamSource<EmgSample>;
pub type HeartRateSource = StreamSource<HeartRateSample>;

/// Subscription phase of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePhase {
    /// No remote listener.
    Unsubscribed,
    /// Listener registered, no sample decoded yet.
    Subscribed,
    /// Listener registered and samples flowing.
    Receiving,
    /// Remote failure delivered; waiting for consumers to detach.
    Cancelled,
}

impl SourcePhase {
    /// Whether a remote listener is registered. A cancelled listener has
    /// already been dropped by the database.
    pub fn has_listener(&self) -> bool {
        matches!(self, Self::Subscribed | Self::Receiving)
    }
}

impl fmt::Display for SourcePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsubscribed => write!(f, "unsubscribed"),
            Self::Subscribed => write!(f, "subscribed"),
            Self::Receiving => write!(f, "receiving"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Notification counters for one source, across listener sessions.
#[derive(Debug, Default)]
pub struct SourceStats {
    notifications: AtomicU64,
    decoded: AtomicU64,
    decode_failures: AtomicU64,
    empty_payloads: AtomicU64,
    remote_errors: AtomicU64,
    listeners_opened: AtomicU64,
    listeners_closed: AtomicU64,
}

/// Point-in-time copy of `SourceStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceStatsSnapshot {
    pub notifications: u64,
    pub decoded: u64,
    pub decode_failures: u64,
    pub empty_payloads: u64,
    pub remote_errors: u64,
    pub listeners_opened: u64,
    pub listeners_closed: u64,
}

impl SourceStats {
    pub fn snapshot(&self) -> SourceStatsSnapshot {
        SourceStatsSnapshot {
            notifications: self.notifications.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            empty_payloads: self.empty_payloads.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
            listeners_opened: self.listeners_opened.load(Ordering::Relaxed),
            listeners_closed: self.listeners_closed.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Value published to consumers.
#[derive(Debug, Clone)]
enum Signal<S> {
    /// Nothing decoded yet.
    Idle,
    Sample(S),
    Terminated(SourceError),
}

/// Listener registered with the database for one session.
struct SourceListener<S> {
    channel: Channel,
    tx: watch::Sender<Signal<S>>,
    stats: Arc<SourceStats>,
}

impl<S: ChannelSample> SourceListener<S> {
    fn new(stats: Arc<SourceStats>) -> Self {
        let (tx, _rx) = watch::channel(Signal::Idle);
        Self {
            channel: S::CHANNEL,
            tx,
            stats,
        }
    }

    fn publish(&self, sample: S) {
        self.tx.send_if_modified(|signal| {
            if matches!(signal, Signal::Terminated(_)) {
                return false;
            }
            *signal = Signal::Sample(sample);
            true
        });
    }

    fn phase(&self) -> SourcePhase {
        match &*self.tx.borrow() {
            Signal::Idle => SourcePhase::Subscribed,
            Signal::Sample(_) => SourcePhase::Receiving,
            Signal::Terminated(_) => SourcePhase::Cancelled,
        }
    }
}

impl<S: ChannelSample> ValueListener for SourceListener<S> {
    fn on_data_change(&self, snapshot: DataSnapshot) {
        SourceStats::bump(&self.stats.notifications);

        let payload = match snapshot.payload() {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                SourceStats::bump(&self.stats.empty_payloads);
                debug!(channel = %self.channel, path = %snapshot.path(), "Empty payload");
                return;
            }
            Err(e) => {
                SourceStats::bump(&self.stats.decode_failures);
                warn!(channel = %self.channel, error = %e, "Dropping update");
                return;
            }
        };

        match S::decode(payload) {
            Ok(sample) => {
                SourceStats::bump(&self.stats.decoded);
                self.publish(sample);
            }
            Err(e) => {
                SourceStats::bump(&self.stats.decode_failures);
                warn!(
                    channel = %self.channel,
                    error = %e,
                    payload_len = payload.len(),
                    "Dropping malformed payload"
                );
            }
        }
    }

    fn on_cancelled(&self, remote: RemoteError) {
        SourceStats::bump(&self.stats.remote_errors);
        error!(channel = %self.channel, error = %remote, "Remote listener cancelled");

        let channel = self.channel;
        self.tx.send_if_modified(|signal| {
            if matches!(signal, Signal::Terminated(_)) {
                return false;
            }
            *signal = Signal::Terminated(SourceError::Remote {
                channel,
                error: remote,
            });
            true
        });
    }
}

struct Session<S> {
    listener_id: ListenerId,
    listener: Arc<SourceListener<S>>,
}

struct Inner<S> {
    consumers: usize,
    session: Option<Session<S>>,
}

struct Shared<S> {
    path: String,
    database: Arc<dyn RealtimeDatabase>,
    stats: Arc<SourceStats>,
    inner: Mutex<Inner<S>>,
}

impl<S: ChannelSample> Shared<S> {
    /// Drop one consumer; tear the listener down if it was the last.
    fn release_consumer(&self) {
        let session = {
            let mut inner = self.inner.lock();
            inner.consumers = inner.consumers.saturating_sub(1);
            if inner.consumers == 0 {
                inner.session.take()
            } else {
                None
            }
        };

        if let Some(session) = session {
            self.database.unsubscribe(session.listener_id);
            SourceStats::bump(&self.stats.listeners_closed);
            info!(
                channel = %S::CHANNEL,
                path = %self.path,
                listener = %session.listener_id,
                "Listener released"
            );
        }
    }
}

/// Observable stream of decoded samples for one channel.
pub struct StreamSource<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for StreamSource<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S: ChannelSample> StreamSource<S> {
    /// Source on the channel's default path.
    pub fn new(database: Arc<dyn RealtimeDatabase>) -> Self {
        Self::with_path(database, S::CHANNEL.default_path())
    }

    /// Source on an explicit path.
    pub fn with_path(database: Arc<dyn RealtimeDatabase>, path: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: path.into(),
                database,
                stats: Arc::new(SourceStats::default()),
                inner: Mutex::new(Inner {
                    consumers: 0,
                    session: None,
                }),
            }),
        }
    }

    pub fn channel(&self) -> Channel {
        S::CHANNEL
    }

    pub fn path(&self) -> &str {
        &self.shared.path
    }

    /// Attach a consumer.
    ///
    /// Registers the remote listener if this is the only consumer. The
    /// returned stream yields the latest sample (if any) first, then every
    /// later one. It ends after yielding a terminal `SourceError`.
    pub fn attach(&self) -> SourceResult<SampleStream<S>> {
        let mut inner = self.shared.inner.lock();

        let rx = match &inner.session {
            Some(session) => session.listener.tx.subscribe(),
            None => {
                let listener = Arc::new(SourceListener::<S>::new(self.shared.stats.clone()));
                let rx = listener.tx.subscribe();
                let listener_id = self
                    .shared
                    .database
                    .subscribe(&self.shared.path, listener.clone())
                    .map_err(|error| SourceError::Subscribe {
                        channel: S::CHANNEL,
                        error,
                    })?;

                SourceStats::bump(&self.shared.stats.listeners_opened);
                info!(
                    channel = %S::CHANNEL,
                    path = %self.shared.path,
                    listener = %listener_id,
                    "Listener established"
                );
                inner.session = Some(Session {
                    listener_id,
                    listener,
                });
                rx
            }
        };

        inner.consumers += 1;
        debug!(channel = %S::CHANNEL, consumers = inner.consumers, "Consumer attached");

        Ok(SampleStream {
            inner: WatchStream::new(rx),
            guard: Some(AttachGuard {
                shared: self.shared.clone(),
            }),
        })
    }

    /// Current subscription phase.
    pub fn phase(&self) -> SourcePhase {
        match &self.shared.inner.lock().session {
            Some(session) => session.listener.phase(),
            None => SourcePhase::Unsubscribed,
        }
    }

    /// Number of attached consumers.
    pub fn consumer_count(&self) -> usize {
        self.shared.inner.lock().consumers
    }

    pub fn stats(&self) -> SourceStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

/// Releases one consumer slot when dropped.
struct AttachGuard<S: ChannelSample> {
    shared: Arc<Shared<S>>,
}

impl<S: ChannelSample> Drop for AttachGuard<S> {
    fn drop(&mut self) {
        self.shared.release_consumer();
    }
}

/// Consumer handle returned by `StreamSource::attach`.
///
/// Yields `Ok(sample)` for every decoded update it observes (keep-latest:
/// intermediate samples may be skipped by a slow consumer) and at most one
/// `Err`. Dropping it, calling `detach`, or reaching the end of the stream
/// detaches the consumer.
pub struct SampleStream<S: ChannelSample> {
    inner: WatchStream<Signal<S>>,
    guard: Option<AttachGuard<S>>,
}

impl<S: ChannelSample> SampleStream<S> {
    /// Detach now. Equivalent to dropping the stream.
    pub fn detach(mut self) {
        self.guard.take();
    }

    /// Whether this stream still holds its consumer slot.
    pub fn is_attached(&self) -> bool {
        self.guard.is_some()
    }
}

impl<S: ChannelSample> Stream for SampleStream<S> {
    type Item = SourceResult<S>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.guard.is_none() {
            return Poll::Ready(None);
        }

        loop {
            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Signal::Idle) => continue,
                Some(Signal::Sample(sample)) => return Poll::Ready(Some(Ok(sample))),
                Some(Signal::Terminated(e)) => {
                    this.guard.take();
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    this.guard.take();
                    return Poll::Ready(None);
                }
            }
        }
    }
}

/// Type-erased status view of a source.
pub trait SourceStatus: Send + Sync {
    fn channel(&self) -> Channel;
    fn path(&self) -> &str;
    fn phase(&self) -> SourcePhase;
    fn consumer_count(&self) -> usize;
    fn stats(&self) -> SourceStatsSnapshot;
}

impl<S: ChannelSample> SourceStatus for StreamSource<S> {
    fn channel(&self) -> Channel {
        S::CHANNEL
    }

    fn path(&self) -> &str {
        StreamSource::path(self)
    }

    fn phase(&self) -> SourcePhase {
        StreamSource::phase(self)
    }

    fn consumer_count(&self) -> usize {
        StreamSource::consumer_count(self)
    }

    fn stats(&self) -> SourceStatsSnapshot {
        StreamSource::stats(self)
    }
}

/// The three channel sources sharing one database client.
#[derive(Clone)]
pub struct SourceSet {
    pub ecg: EcgSource,
    pub emg: EmgSource,
    pub heart_rate: HeartRateSource,
}

impl SourceSet {
    /// Sources on the default paths.
    pub fn new(database: Arc<dyn RealtimeDatabase>) -> Self {
        Self {
            ecg: EcgSource::new(database.clone()),
            emg: EmgSource::new(database.clone()),
            heart_rate: HeartRateSource::new(database),
        }
    }

    /// Sources on explicit paths.
    pub fn with_paths(
        database: Arc<dyn RealtimeDatabase>,
        ecg_path: &str,
        emg_path: &str,
        heart_rate_path: &str,
    ) -> Self {
        Self {
            ecg: EcgSource::with_path(database.clone(), ecg_path),
            emg: EmgSource::with_path(database.clone(), emg_path),
            heart_rate: HeartRateSource::with_path(database, heart_rate_path),
        }
    }

    /// Status views in channel order.
    pub fn statuses(&self) -> Vec<Arc<dyn SourceStatus>> {
        let ecg: Arc<dyn SourceStatus> = Arc::new(self.ecg.clone());
        let emg: Arc<dyn SourceStatus> = Arc::new(self.emg.clone());
        let heart_rate: Arc<dyn SourceStatus> = Arc::new(self.heart_rate.clone());
        vec![ecg, emg, heart_rate]
    }
}
