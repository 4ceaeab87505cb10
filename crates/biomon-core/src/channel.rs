//! Biosignal channel identifiers.

use crate::error::UnknownChannel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the three logical biosignal streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Electrocardiogram waveform batches.
    Ecg,
    /// Electromyogram waveform batches.
    Emg,
    /// Heart rate in beats per minute.
    HeartRate,
}

impl Channel {
    /// All channels, in display order.
    pub const ALL: [Channel; 3] = [Channel::Ecg, Channel::Emg, Channel::HeartRate];

    /// Stable lowercase name, used for log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ecg => "ecg",
            Self::Emg => "emg",
            Self::HeartRate => "heart_rate",
        }
    }

    /// Default remote path holding the channel's latest payload.
    pub fn default_path(&self) -> &'static str {
        match self {
            Self::Ecg => "ecg/latest",
            Self::Emg => "emg/latest",
            Self::HeartRate => "heartrate/latest",
        }
    }

    /// Whether samples on this channel carry a batch of readings.
    pub fn is_waveform(&self) -> bool {
        matches!(self, Self::Ecg | Self::Emg)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ecg" => Ok(Self::Ecg),
            "emg" => Ok(Self::Emg),
            "heart_rate" | "heartrate" | "hr" => Ok(Self::HeartRate),
            _ => Err(UnknownChannel(s.to_string())),
        }
    }
}
