//! Latest-value signal store.
//!
//! One slot per channel. Each slot keeps only the newest sample; writers
//! overwrite, readers get the current value, and observers are replayed the
//! current value before seeing changes.

use biomon_core::{Channel, ChannelSample, EcgSample, EmgSample, HeartRateSample, Sample};
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

/// Per-slot bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotInfo {
    /// Number of updates written to the slot.
    pub updates: u64,
    /// Wall clock time of the last update.
    pub last_update: Option<DateTime<Utc>>,
    /// Milliseconds since the last update (monotonic).
    pub age_ms: Option<u64>,
}

struct Slot<T> {
    tx: watch::Sender<T>,
    updates: AtomicU64,
    last_update: RwLock<Option<(DateTime<Utc>, Instant)>>,
}

impl<T: ChannelSample> Slot<T> {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(T::default());
        Self {
            tx,
            updates: AtomicU64::new(0),
            last_update: RwLock::new(None),
        }
    }

    fn store(&self, sample: T) {
        let previous = self.tx.borrow().timestamp();
        if sample.timestamp() < previous {
            // Producer clocks are advisory; the newest write still wins.
            debug!(
                channel = %T::CHANNEL,
                previous,
                timestamp = sample.timestamp(),
                "Timestamp regression"
            );
        }

        self.tx.send_replace(sample);
        self.updates.fetch_add(1, Ordering::Relaxed);
        *self.last_update.write() = Some((Utc::now(), Instant::now()));
    }

    fn current(&self) -> T {
        self.tx.borrow().clone()
    }

    fn info(&self) -> SlotInfo {
        let last = *self.last_update.read();
        SlotInfo {
            updates: self.updates.load(Ordering::Relaxed),
            last_update: last.map(|(at, _)| at),
            age_ms: last.map(|(_, mono)| mono.elapsed().as_millis() as u64),
        }
    }
}

/// Point-in-time copy of all slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreSnapshot {
    pub ecg: EcgSample,
    pub emg: EmgSample,
    pub heart_rate: HeartRateSample,
    /// Store version the snapshot was taken at.
    pub version: u64,
}

/// Latest sample per channel.
pub struct SignalStore {
    ecg: Slot<EcgSample>,
    emg: Slot<EmgSample>,
    heart_rate: Slot<HeartRateSample>,
    /// Bumped on every update to any slot.
    version: AtomicU64,
}

impl SignalStore {
    pub fn new() -> Self {
        Self {
            ecg: Slot::new(),
            emg: Slot::new(),
            heart_rate: Slot::new(),
            version: AtomicU64::new(0),
        }
    }

    /// Overwrite the sample's channel slot.
    pub fn update(&self, sample: Sample) {
        match sample {
            Sample::Ecg(s) => self.ecg.store(s),
            Sample::Emg(s) => self.emg.store(s),
            Sample::HeartRate(s) => self.heart_rate.store(s),
        }
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Latest sample on `channel`, or its empty default.
    pub fn current(&self, channel: Channel) -> Sample {
        match channel {
            Channel::Ecg => Sample::Ecg(self.ecg.current()),
            Channel::Emg => Sample::Emg(self.emg.current()),
            Channel::HeartRate => Sample::HeartRate(self.heart_rate.current()),
        }
    }

    pub fn ecg(&self) -> EcgSample {
        self.ecg.current()
    }

    pub fn emg(&self) -> EmgSample {
        self.emg.current()
    }

    pub fn heart_rate(&self) -> HeartRateSample {
        self.heart_rate.current()
    }

    pub fn watch_ecg(&self) -> watch::Receiver<EcgSample> {
        self.ecg.tx.subscribe()
    }

    pub fn watch_emg(&self) -> watch::Receiver<EmgSample> {
        self.emg.tx.subscribe()
    }

    pub fn watch_heart_rate(&self) -> watch::Receiver<HeartRateSample> {
        self.heart_rate.tx.subscribe()
    }

    /// Observe `channel`: yields the current value, then every change.
    ///
    /// Keep-latest: a slow observer skips intermediate values but never sees
    /// an older value after a newer one.
    pub fn observe(&self, channel: Channel) -> impl Stream<Item = Sample> + Send + Unpin + 'static {
        match channel {
            Channel::Ecg => WatchStream::new(self.watch_ecg())
                .map(Sample::Ecg)
                .boxed(),
            Channel::Emg => WatchStream::new(self.watch_emg())
                .map(Sample::Emg)
                .boxed(),
            Channel::HeartRate => WatchStream::new(self.watch_heart_rate())
                .map(Sample::HeartRate)
                .boxed(),
        }
    }

    /// Change counter across all slots.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn slot_info(&self, channel: Channel) -> SlotInfo {
        match channel {
            Channel::Ecg => self.ecg.info(),
            Channel::Emg => self.emg.info(),
            Channel::HeartRate => self.heart_rate.info(),
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        // Read the version first so a concurrent update is picked up next time.
        let version = self.version();
        StoreSnapshot {
            ecg: self.ecg.current(),
            emg: self.emg.current(),
            heart_rate: self.heart_rate.current(),
            version,
        }
    }
}

impl Default for SignalStore {
    fn default() -> Self {
        Self::new()
    }
}
