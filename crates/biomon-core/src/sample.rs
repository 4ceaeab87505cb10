//! Decoded sample records.
//!
//! All records are immutable value objects. `Default` is the "no data yet"
//! state a consumer sees before the first update arrives.

use crate::Channel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Batch of ECG readings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcgSample {
    /// Raw ADC readings in acquisition order.
    pub data: Vec<i32>,
    /// Epoch milliseconds assigned by the producer.
    pub timestamp: i64,
}

impl EcgSample {
    pub fn new(data: Vec<i32>, timestamp: i64) -> Self {
        Self { data, timestamp }
    }

    /// True before the first batch has been received.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Batch of EMG readings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmgSample {
    /// Raw ADC readings in acquisition order.
    pub data: Vec<i32>,
    /// Epoch milliseconds assigned by the producer.
    pub timestamp: i64,
}

impl EmgSample {
    pub fn new(data: Vec<i32>, timestamp: i64) -> Self {
        Self { data, timestamp }
    }

    /// True before the first batch has been received.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Single heart rate reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartRateSample {
    /// Beats per minute. Zero means no data yet.
    pub value: u32,
    /// Epoch milliseconds assigned by the producer.
    pub timestamp: i64,
}

impl HeartRateSample {
    pub fn new(value: u32, timestamp: i64) -> Self {
        Self { value, timestamp }
    }

    /// True while no beat rate is known.
    pub fn is_empty(&self) -> bool {
        self.value == 0
    }
}

/// A decoded sample from any channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum Sample {
    Ecg(EcgSample),
    Emg(EmgSample),
    HeartRate(HeartRateSample),
}

impl Sample {
    /// The default/empty sample for a channel.
    pub fn empty(channel: Channel) -> Self {
        match channel {
            Channel::Ecg => Self::Ecg(EcgSample::default()),
            Channel::Emg => Self::Emg(EmgSample::default()),
            Channel::HeartRate => Self::HeartRate(HeartRateSample::default()),
        }
    }

    /// Channel this sample belongs to.
    pub fn channel(&self) -> Channel {
        match self {
            Self::Ecg(_) => Channel::Ecg,
            Self::Emg(_) => Channel::Emg,
            Self::HeartRate(_) => Channel::HeartRate,
        }
    }

    /// Producer timestamp in epoch milliseconds.
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Ecg(s) => s.timestamp,
            Self::Emg(s) => s.timestamp,
            Self::HeartRate(s) => s.timestamp,
        }
    }

    /// Producer timestamp as a UTC datetime, if representable.
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Ecg(s) => s.is_empty(),
            Self::Emg(s) => s.is_empty(),
            Self::HeartRate(s) => s.is_empty(),
        }
    }
}

impl From<EcgSample> for Sample {
    fn from(sample: EcgSample) -> Self {
        Self::Ecg(sample)
    }
}

impl From<EmgSample> for Sample {
    fn from(sample: EmgSample) -> Self {
        Self::Emg(sample)
    }
}

impl From<HeartRateSample> for Sample {
    fn from(sample: HeartRateSample) -> Self {
        Self::HeartRate(sample)
    }
}
