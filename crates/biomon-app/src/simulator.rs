//! Synthetic signal generator.
//!
//! Writes payloads into a `MemoryDatabase` in the same string-encoded form
//! the hosted database holds, so the full decode path is exercised:
//! - ECG: baseline with a P-QRS-T complex per beat
//! - EMG: noise under a slowly varying activation envelope
//! - heart rate: random walk clamped to a resting range
//!
//! A configurable fraction of payloads is written malformed.

use biomon_source::MemoryDatabase;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{PathsConfig, SimulatorConfig};

/// 12-bit ADC midpoint.
const BASELINE: f64 = 2048.0;
const ADC_MAX: i32 = 4095;
const MIN_BPM: u32 = 50;
const MAX_BPM: u32 = 140;

const MALFORMED: [&str; 4] = [
    "not json",
    r#"{"data":"oops","timestamp":0}"#,
    r#"{"value":-5,"timestamp":0}"#,
    r#"{"timestamp":"#,
];

fn gaussian(x: f64, center: f64, width: f64) -> f64 {
    (-((x - center) / width).powi(2) / 2.0).exp()
}

/// ECG amplitude (ADC units above baseline) at `phase` within a beat, `[0, 1)`.
pub fn ecg_wave(phase: f64) -> f64 {
    120.0 * gaussian(phase, 0.18, 0.025) // P
        - 150.0 * gaussian(phase, 0.36, 0.008) // Q
        + 1400.0 * gaussian(phase, 0.39, 0.011) // R
        - 300.0 * gaussian(phase, 0.42, 0.01) // S
        + 280.0 * gaussian(phase, 0.68, 0.045) // T
}

fn to_adc(value: f64) -> i32 {
    (value.round() as i32).clamp(0, ADC_MAX)
}

/// Random-walk step for the heart rate, clamped to the resting range.
pub fn next_bpm(current: u32, step: i32) -> u32 {
    let next = i64::from(current) + i64::from(step);
    next.clamp(i64::from(MIN_BPM), i64::from(MAX_BPM)) as u32
}

/// Generator state.
pub struct Simulator {
    database: Arc<MemoryDatabase>,
    paths: PathsConfig,
    config: SimulatorConfig,
    rng: StdRng,
    bpm: u32,
    /// Beat phase in `[0, 1)`.
    beat_phase: f64,
    emg_envelope: f64,
}

impl Simulator {
    pub fn new(database: Arc<MemoryDatabase>, paths: PathsConfig, config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            database,
            paths,
            bpm: config.base_bpm.clamp(MIN_BPM, MAX_BPM),
            config,
            rng,
            beat_phase: 0.0,
            emg_envelope: 0.2,
        }
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    /// Next ECG batch. Beat phase carries over between batches.
    pub fn ecg_batch(&mut self) -> Vec<i32> {
        let dt_ms = 1000.0 / f64::from(self.config.sample_rate_hz);
        let beat_ms = 60_000.0 / f64::from(self.bpm);

        (0..self.config.batch_size)
            .map(|_| {
                let noise = self.rng.random_range(-15.0..15.0);
                let value = BASELINE + ecg_wave(self.beat_phase) + noise;
                self.beat_phase = (self.beat_phase + dt_ms / beat_ms).fract();
                to_adc(value)
            })
            .collect()
    }

    /// Next EMG batch.
    pub fn emg_batch(&mut self) -> Vec<i32> {
        // envelope drifts between rest and contraction
        let drift = self.rng.random_range(-0.15..0.15);
        self.emg_envelope = (self.emg_envelope + drift).clamp(0.05, 1.0);
        let amplitude = 900.0 * self.emg_envelope;

        (0..self.config.batch_size)
            .map(|i| {
                let carrier = (2.0 * PI * i as f64 / 7.0).sin();
                let noise: f64 = self.rng.random_range(-1.0..1.0);
                to_adc(BASELINE + amplitude * (0.4 * carrier + 0.6 * noise))
            })
            .collect()
    }

    /// Advance the heart rate one random-walk step.
    pub fn step_heart_rate(&mut self) -> u32 {
        let step = self.rng.random_range(-3..=3);
        self.bpm = next_bpm(self.bpm, step);
        self.bpm
    }

    /// Either `payload` or, at the configured rate, a malformed one.
    fn maybe_corrupt(&mut self, payload: String) -> String {
        if self.config.malformed_rate > 0.0 && self.rng.random_bool(self.config.malformed_rate) {
            let bad = MALFORMED[self.rng.random_range(0..MALFORMED.len())];
            debug!(payload = bad, "Writing malformed payload");
            bad.to_string()
        } else {
            payload
        }
    }

    /// Write one ECG and one EMG batch.
    pub fn publish_waveforms(&mut self, timestamp: i64) {
        let ecg = json!({"data": self.ecg_batch(), "timestamp": timestamp}).to_string();
        let ecg = self.maybe_corrupt(ecg);
        self.database.set_string(&self.paths.ecg, ecg);

        let emg = json!({"data": self.emg_batch(), "timestamp": timestamp}).to_string();
        let emg = self.maybe_corrupt(emg);
        self.database.set_string(&self.paths.emg, emg);
    }

    /// Write one heart rate update.
    pub fn publish_heart_rate(&mut self, timestamp: i64) {
        let bpm = self.step_heart_rate();
        let payload = json!({"value": bpm, "timestamp": timestamp}).to_string();
        let payload = self.maybe_corrupt(payload);
        self.database.set_string(&self.paths.heart_rate, payload);
    }

    /// Generate until `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut waveform_tick =
            tokio::time::interval(Duration::from_millis(self.config.waveform_interval_ms));
        let mut heart_rate_tick =
            tokio::time::interval(Duration::from_millis(self.config.heart_rate_interval_ms));

        info!(
            bpm = self.bpm,
            batch_size = self.config.batch_size,
            malformed_rate = self.config.malformed_rate,
            "Simulator started"
        );

        loop {
            tokio::select! {
                _ = waveform_tick.tick() => {
                    self.publish_waveforms(Utc::now().timestamp_millis());
                }
                _ = heart_rate_tick.tick() => {
                    self.publish_heart_rate(Utc::now().timestamp_millis());
                }
                _ = shutdown.cancelled() => {
                    info!("Simulator stopped");
                    return;
                }
            }
        }
    }
}
