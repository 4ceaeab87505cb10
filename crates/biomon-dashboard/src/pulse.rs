//! Heart pulse cue.
//!
//! Every beat lights the indicator for a fixed 100 ms, then leaves it off for
//! the rest of the beat period (`60000 / bpm` ms, integer division). A zero
//! bpm disables the pulse.

use biomon_core::HeartRateSample;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// On-duration of every beat.
pub const PULSE_ON_MS: u64 = 100;

const MS_PER_MINUTE: u64 = 60_000;

/// Indicator phase within one beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PulsePhase {
    On,
    Off,
}

/// Timing of one beat cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PulseCue {
    pub bpm: u32,
    pub on_ms: u64,
    pub off_ms: u64,
}

impl PulseCue {
    /// Cue for `bpm`, or `None` when the rate is zero.
    ///
    /// Rates above 600 bpm have a beat period shorter than the on-duration;
    /// the off-duration saturates at zero.
    pub fn from_bpm(bpm: u32) -> Option<Self> {
        if bpm == 0 {
            return None;
        }
        let period = MS_PER_MINUTE / u64::from(bpm);
        Some(Self {
            bpm,
            on_ms: PULSE_ON_MS,
            off_ms: period.saturating_sub(PULSE_ON_MS),
        })
    }

    pub fn on_duration(&self) -> Duration {
        Duration::from_millis(self.on_ms)
    }

    pub fn off_duration(&self) -> Duration {
        Duration::from_millis(self.off_ms)
    }

    pub fn period_ms(&self) -> u64 {
        self.on_ms + self.off_ms
    }

    /// Phase `elapsed` after the cycle started.
    pub fn phase_at(&self, elapsed: Duration) -> PulsePhase {
        let into_beat = elapsed.as_millis() as u64 % self.period_ms();
        if into_beat < self.on_ms {
            PulsePhase::On
        } else {
            PulsePhase::Off
        }
    }
}

fn set_beating(beating: &watch::Sender<bool>, on: bool) {
    beating.send_if_modified(|current| std::mem::replace(current, on) != on);
}

/// Drive `beating` from the heart rate slot until shutdown or until the slot's
/// sender is dropped.
///
/// Every heart rate change restarts the cycle from the on phase.
pub async fn run_pulse(
    mut heart_rate: watch::Receiver<HeartRateSample>,
    beating: watch::Sender<bool>,
    shutdown: CancellationToken,
) {
    loop {
        let sample = *heart_rate.borrow_and_update();

        let keep_running = match PulseCue::from_bpm(sample.value) {
            None => {
                set_beating(&beating, false);
                tokio::select! {
                    changed = heart_rate.changed() => changed.is_ok(),
                    _ = shutdown.cancelled() => false,
                }
            }
            Some(cue) => {
                debug!(bpm = cue.bpm, off_ms = cue.off_ms, "Pulse cycle started");
                loop {
                    set_beating(&beating, true);
                    tokio::select! {
                        _ = tokio::time::sleep(cue.on_duration()) => {}
                        changed = heart_rate.changed() => break changed.is_ok(),
                        _ = shutdown.cancelled() => break false,
                    }

                    set_beating(&beating, false);
                    tokio::select! {
                        _ = tokio::time::sleep(cue.off_duration()) => {}
                        changed = heart_rate.changed() => break changed.is_ok(),
                        _ = shutdown.cancelled() => break false,
                    }
                }
            }
        };

        if !keep_running {
            break;
        }
    }

    set_beating(&beating, false);
    debug!("Pulse driver stopped");
}
