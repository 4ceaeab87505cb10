//! Dashboard API types.
//!
//! These types are used for JSON serialization in REST and WebSocket APIs.

use biomon_core::Channel;
use biomon_source::{SourcePhase, SourceStatsSnapshot};
use serde::Serialize;

use crate::chart::{ChartPoint, DisplayRange};
use crate::pulse::PulseCue;

/// Whether a channel has produced a sample yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatus {
    /// No sample yet.
    Waiting,
    Live,
}

/// Chart view of an ECG or EMG slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaveformView {
    pub status: ViewStatus,
    /// Producer timestamp of the plotted batch (epoch ms).
    pub timestamp: Option<i64>,
    /// Number of readings in the batch.
    pub readings: usize,
    pub points: Vec<ChartPoint>,
}

/// Heart rate view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartRateView {
    pub status: ViewStatus,
    pub bpm: u32,
    pub timestamp: Option<i64>,
    /// Beat timing; absent while bpm is zero.
    pub pulse: Option<PulseCue>,
    /// Indicator state from the pulse driver.
    pub beating: bool,
}

/// Remote listener status for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceView {
    pub channel: Channel,
    pub path: String,
    pub phase: SourcePhase,
    pub consumers: usize,
    pub stats: SourceStatsSnapshot,
}

/// Full dashboard state snapshot (sent on initial connection and via REST).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    /// Timestamp when snapshot was taken (Unix milliseconds).
    pub timestamp_ms: i64,
    /// Store version the views were built from.
    pub version: u64,
    pub display_range: DisplayRange,
    pub ecg: WaveformView,
    pub emg: WaveformView,
    pub heart_rate: HeartRateView,
    pub sources: Vec<SourceView>,
}

/// WebSocket message types.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardMessage {
    /// Full snapshot (sent on connect).
    Snapshot(DashboardSnapshot),
    /// Sent whenever the store or the pulse indicator changed.
    Update(DashboardSnapshot),
}
