//! Prometheus metrics for biomon.
//!
//! Covers per-channel sample flow (decoded, dropped, empty), remote listener
//! state, sample lag and the current heart rate.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error caught at startup.

use biomon_core::Channel;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    Encoder, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Samples decoded and published.
pub static SAMPLES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "biomon_samples_total",
        "Total samples decoded and published",
        &["channel"]
    )
    .unwrap()
});

/// Payloads dropped by the decoder.
pub static DECODE_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "biomon_decode_failures_total",
        "Total payloads dropped because they failed to decode",
        &["channel"]
    )
    .unwrap()
});

/// Notifications that carried no value.
pub static EMPTY_PAYLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "biomon_empty_payloads_total",
        "Total notifications without a value",
        &["channel"]
    )
    .unwrap()
});

/// Remote cancellations and transport failures.
pub static REMOTE_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "biomon_remote_errors_total",
        "Total remote listener failures",
        &["channel"]
    )
    .unwrap()
});

/// Remote listeners currently registered (0 or 1 per channel).
pub static ACTIVE_LISTENERS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "biomon_active_listeners",
        "Remote listeners currently registered",
        &["channel"]
    )
    .unwrap()
});

/// Latest heart rate in beats per minute (0 = no data).
pub static HEART_RATE_BPM: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("biomon_heart_rate_bpm", "Latest heart rate in bpm").unwrap()
});

/// Wall clock minus producer timestamp, in milliseconds.
pub static SAMPLE_LAG_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "biomon_sample_lag_ms",
        "Delay between sample production and observation in milliseconds",
        &["channel"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn samples_decoded(channel: Channel, count: u64) {
        SAMPLES_TOTAL
            .with_label_values(&[channel.as_str()])
            .inc_by(count);
    }

    pub fn decode_failures(channel: Channel, count: u64) {
        DECODE_FAILURES_TOTAL
            .with_label_values(&[channel.as_str()])
            .inc_by(count);
    }

    pub fn empty_payloads(channel: Channel, count: u64) {
        EMPTY_PAYLOADS_TOTAL
            .with_label_values(&[channel.as_str()])
            .inc_by(count);
    }

    pub fn remote_errors(channel: Channel, count: u64) {
        REMOTE_ERRORS_TOTAL
            .with_label_values(&[channel.as_str()])
            .inc_by(count);
    }

    pub fn listener_active(channel: Channel, active: bool) {
        ACTIVE_LISTENERS
            .with_label_values(&[channel.as_str()])
            .set(i64::from(active));
    }

    pub fn heart_rate(bpm: u32) {
        HEART_RATE_BPM.set(i64::from(bpm));
    }

    /// Record lag for a sample produced at `timestamp_ms` and seen at `now_ms`.
    /// Negative lag (producer clock ahead) is recorded as zero.
    pub fn sample_lag(channel: Channel, timestamp_ms: i64, now_ms: i64) {
        let lag = now_ms.saturating_sub(timestamp_ms).max(0) as f64;
        SAMPLE_LAG_MS
            .with_label_values(&[channel.as_str()])
            .observe(lag);
    }

    /// Text exposition of the default registry.
    pub fn gather_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
