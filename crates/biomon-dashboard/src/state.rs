//! Dashboard state.
//!
//! Turns the signal store into renderable views: waveform batches become
//! normalized chart series and the heart rate becomes a number plus a pulse
//! cue. Source status is read through `SourceStatus`.

use std::sync::Arc;

use biomon_core::{EcgSample, EmgSample, HeartRateSample};
use biomon_feed::SignalStore;
use biomon_source::SourceStatus;
use chrono::Utc;
use tokio::sync::watch;

use crate::chart::{normalize, DisplayRange};
use crate::pulse::PulseCue;
use crate::types::{DashboardSnapshot, HeartRateView, SourceView, ViewStatus, WaveformView};

/// Change marker: store version plus pulse indicator state.
pub type ChangeKey = (u64, bool);

#[derive(Clone)]
pub struct DashboardState {
    store: Arc<SignalStore>,
    sources: Vec<Arc<dyn SourceStatus>>,
    range: DisplayRange,
    beating: watch::Receiver<bool>,
}

impl DashboardState {
    pub fn new(
        store: Arc<SignalStore>,
        sources: Vec<Arc<dyn SourceStatus>>,
        range: DisplayRange,
        beating: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            sources,
            range,
            beating,
        }
    }

    pub fn change_key(&self) -> ChangeKey {
        (self.store.version(), *self.beating.borrow())
    }

    /// Collect a full snapshot of the current state.
    pub fn collect_snapshot(&self) -> DashboardSnapshot {
        let store = self.store.snapshot();

        DashboardSnapshot {
            timestamp_ms: Utc::now().timestamp_millis(),
            version: store.version,
            display_range: self.range,
            ecg: ecg_view(&store.ecg, &self.range),
            emg: emg_view(&store.emg, &self.range),
            heart_rate: heart_rate_view(store.heart_rate, *self.beating.borrow()),
            sources: self.collect_sources(),
        }
    }

    fn collect_sources(&self) -> Vec<SourceView> {
        self.sources
            .iter()
            .map(|source| SourceView {
                channel: source.channel(),
                path: source.path().to_string(),
                phase: source.phase(),
                consumers: source.consumer_count(),
                stats: source.stats(),
            })
            .collect()
    }
}

/// Chart view of a waveform batch. An empty batch is "waiting".
pub fn waveform_view(readings: &[i32], timestamp: i64, range: &DisplayRange) -> WaveformView {
    if readings.is_empty() {
        return WaveformView {
            status: ViewStatus::Waiting,
            timestamp: None,
            readings: 0,
            points: Vec::new(),
        };
    }

    WaveformView {
        status: ViewStatus::Live,
        timestamp: Some(timestamp),
        readings: readings.len(),
        points: normalize(readings, *range),
    }
}

pub fn ecg_view(sample: &EcgSample, range: &DisplayRange) -> WaveformView {
    waveform_view(&sample.data, sample.timestamp, range)
}

pub fn emg_view(sample: &EmgSample, range: &DisplayRange) -> WaveformView {
    waveform_view(&sample.data, sample.timestamp, range)
}

/// Heart rate view. Zero bpm is "waiting" with no pulse.
pub fn heart_rate_view(sample: HeartRateSample, beating: bool) -> HeartRateView {
    let pulse = PulseCue::from_bpm(sample.value);
    HeartRateView {
        status: if sample.is_empty() {
            ViewStatus::Waiting
        } else {
            ViewStatus::Live
        },
        bpm: sample.value,
        timestamp: (!sample.is_empty()).then_some(sample.timestamp),
        beating: beating && pulse.is_some(),
        pulse,
    }
}
