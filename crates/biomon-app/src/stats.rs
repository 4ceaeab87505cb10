//! Periodic source statistics.
//!
//! Each report logs per-channel counters and pushes the deltas since the
//! previous report into the Prometheus counters, together with listener state
//! and the current heart rate.

use biomon_core::Channel;
use biomon_feed::SignalStore;
use biomon_source::{SourcePhase, SourceStatsSnapshot, SourceStatus};
use biomon_telemetry::Metrics;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Per-channel summary produced by one report.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReport {
    pub channel: Channel,
    pub phase: SourcePhase,
    /// Whether a remote listener is registered.
    pub listening: bool,
    pub consumers: usize,
    pub totals: SourceStatsSnapshot,
    /// Counter increase since the previous report.
    pub delta: SourceStatsSnapshot,
    pub store_updates: u64,
}

pub struct StatsReporter {
    sources: Vec<Arc<dyn SourceStatus>>,
    store: Arc<SignalStore>,
    last: HashMap<Channel, SourceStatsSnapshot>,
}

fn delta(now: &SourceStatsSnapshot, before: &SourceStatsSnapshot) -> SourceStatsSnapshot {
    SourceStatsSnapshot {
        notifications: now.notifications.saturating_sub(before.notifications),
        decoded: now.decoded.saturating_sub(before.decoded),
        decode_failures: now.decode_failures.saturating_sub(before.decode_failures),
        empty_payloads: now.empty_payloads.saturating_sub(before.empty_payloads),
        remote_errors: now.remote_errors.saturating_sub(before.remote_errors),
        listeners_opened: now.listeners_opened.saturating_sub(before.listeners_opened),
        listeners_closed: now.listeners_closed.saturating_sub(before.listeners_closed),
    }
}

impl StatsReporter {
    pub fn new(sources: Vec<Arc<dyn SourceStatus>>, store: Arc<SignalStore>) -> Self {
        Self {
            sources,
            store,
            last: HashMap::new(),
        }
    }

    /// Take one report, update metrics and log it.
    pub fn report(&mut self) -> Vec<ChannelReport> {
        let mut reports = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let channel = source.channel();
            let totals = source.stats();
            let delta = delta(&totals, &self.last.get(&channel).copied().unwrap_or_default());
            self.last.insert(channel, totals);

            let phase = source.phase();
            let listening = phase.has_listener();
            Metrics::samples_decoded(channel, delta.decoded);
            Metrics::decode_failures(channel, delta.decode_failures);
            Metrics::empty_payloads(channel, delta.empty_payloads);
            Metrics::remote_errors(channel, delta.remote_errors);
            Metrics::listener_active(channel, listening);

            let store_updates = self.store.slot_info(channel).updates;

            info!(
                channel = %channel,
                path = %source.path(),
                phase = %phase,
                consumers = source.consumer_count(),
                decoded = totals.decoded,
                decode_failures = totals.decode_failures,
                empty_payloads = totals.empty_payloads,
                remote_errors = totals.remote_errors,
                new_samples = delta.decoded,
                "Source stats"
            );

            reports.push(ChannelReport {
                channel,
                phase,
                listening,
                consumers: source.consumer_count(),
                totals,
                delta,
                store_updates,
            });
        }

        Metrics::heart_rate(self.store.heart_rate().value);
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biomon_source::{MemoryDatabase, RemoteError, SourceSet};

    #[tokio::test]
    async fn test_report_deltas() {
        let db = Arc::new(MemoryDatabase::new());
        let sources = SourceSet::new(db.clone());
        let store = Arc::new(SignalStore::new());
        let mut reporter = StatsReporter::new(sources.statuses(), store);

        let _stream = sources.heart_rate.attach().unwrap();
        db.set_string("heartrate/latest", r#"{"value":70,"timestamp":1}"#);
        db.set_string("heartrate/latest", "garbage");

        let first = reporter.report();
        let hr = first
            .iter()
            .find(|r| r.channel == Channel::HeartRate)
            .unwrap();
        assert_eq!(hr.phase, SourcePhase::Receiving);
        assert_eq!(hr.delta.decoded, 1);
        assert_eq!(hr.delta.decode_failures, 1);

        db.set_string("heartrate/latest", r#"{"value":71,"timestamp":2}"#);
        let second = reporter.report();
        let hr = second
            .iter()
            .find(|r| r.channel == Channel::HeartRate)
            .unwrap();
        assert_eq!(hr.totals.decoded, 2);
        assert_eq!(hr.delta.decoded, 1);
        assert_eq!(hr.delta.decode_failures, 0);

        let ecg = second.iter().find(|r| r.channel == Channel::Ecg).unwrap();
        assert_eq!(ecg.phase, SourcePhase::Unsubscribed);
        assert_eq!(ecg.totals, SourceStatsSnapshot::default());
    }

    #[tokio::test]
    async fn test_cancelled_source_is_not_listening() {
        let db = Arc::new(MemoryDatabase::new());
        let sources = SourceSet::new(db.clone());
        let mut reporter = StatsReporter::new(sources.statuses(), Arc::new(SignalStore::new()));

        let _stream = sources.heart_rate.attach().unwrap();
        let hr = |reports: &[ChannelReport]| {
            reports
                .iter()
                .find(|r| r.channel == Channel::HeartRate)
                .cloned()
                .unwrap()
        };
        assert!(hr(&reporter.report()).listening);

        // the stream still holds its slot until it reads the error
        db.cancel_path("heartrate/latest", RemoteError::AuthRevoked);
        assert_eq!(db.listener_count("heartrate/latest"), 0);

        let report = hr(&reporter.report());
        assert_eq!(report.phase, SourcePhase::Cancelled);
        assert!(!report.listening);
        assert_eq!(report.delta.remote_errors, 1);
    }
}
