//! Application configuration.

use crate::error::{AppError, AppResult};
use biomon_core::Channel;
use biomon_dashboard::DashboardConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Env var naming the config file.
pub const CONFIG_ENV: &str = "BIOMON_CONFIG";
/// Config file used when neither `--config` nor `BIOMON_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Where samples come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// Hosted realtime database over REST streaming.
    #[default]
    Live,
    /// In-memory database fed by the simulator.
    Simulated,
}

/// Remote path per channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_ecg_path")]
    pub ecg: String,
    #[serde(default = "default_emg_path")]
    pub emg: String,
    #[serde(default = "default_heart_rate_path")]
    pub heart_rate: String,
}

fn default_ecg_path() -> String {
    Channel::Ecg.default_path().to_string()
}

fn default_emg_path() -> String {
    Channel::Emg.default_path().to_string()
}

fn default_heart_rate_path() -> String {
    Channel::HeartRate.default_path().to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            ecg: default_ecg_path(),
            emg: default_emg_path(),
            heart_rate: default_heart_rate_path(),
        }
    }
}

impl PathsConfig {
    pub fn get(&self, channel: Channel) -> &str {
        match channel {
            Channel::Ecg => &self.ecg,
            Channel::Emg => &self.emg,
            Channel::HeartRate => &self.heart_rate,
        }
    }
}

/// Synthetic signal generator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Interval between ECG / EMG batches (ms). Default: 500.
    #[serde(default = "default_waveform_interval_ms")]
    pub waveform_interval_ms: u64,
    /// Interval between heart rate updates (ms). Default: 2000.
    #[serde(default = "default_heart_rate_interval_ms")]
    pub heart_rate_interval_ms: u64,
    /// Readings per waveform batch. Default: 125 (250 Hz over 500 ms).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Sampling rate of the synthetic waveforms (Hz). Default: 250.
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: u32,
    /// Starting heart rate (bpm). Default: 72.
    #[serde(default = "default_base_bpm")]
    pub base_bpm: u32,
    /// Fraction of payloads written malformed (0.0-1.0). Default: 0.
    #[serde(default)]
    pub malformed_rate: f64,
    /// Fixed RNG seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_waveform_interval_ms() -> u64 {
    500
}

fn default_heart_rate_interval_ms() -> u64 {
    2_000
}

fn default_batch_size() -> usize {
    125
}

fn default_sample_rate_hz() -> u32 {
    250
}

fn default_base_bpm() -> u32 {
    72
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            waveform_interval_ms: default_waveform_interval_ms(),
            heart_rate_interval_ms: default_heart_rate_interval_ms(),
            batch_size: default_batch_size(),
            sample_rate_hz: default_sample_rate_hz(),
            base_bpm: default_base_bpm(),
            malformed_rate: 0.0,
            seed: None,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mode: OperatingMode,
    /// Realtime database root URL (live mode).
    #[serde(default)]
    pub database_url: String,
    /// Connect timeout for listener requests (ms). Default: 10,000.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub paths: PathsConfig,
    /// Interval between stats reports (seconds). Default: 60.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_stats_interval_secs() -> u64 {
    60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::default(),
            database_url: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
            paths: PathsConfig::default(),
            stats_interval_secs: default_stats_interval_secs(),
            dashboard: DashboardConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration: explicit path > `BIOMON_CONFIG` > `config/default.toml`.
    ///
    /// An explicitly named file must exist. A missing default file falls back
    /// to built-in defaults.
    pub fn load(explicit: Option<&str>) -> AppResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_file(&path);
        }

        if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::from_file(DEFAULT_CONFIG_PATH)
        } else {
            tracing::warn!(path = DEFAULT_CONFIG_PATH, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        tracing::info!(config_path = %path, "Loading configuration");
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    pub fn is_simulated(&self) -> bool {
        self.mode == OperatingMode::Simulated
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.mode == OperatingMode::Live && self.database_url.trim().is_empty() {
            return Err(AppError::Config(
                "database_url is required in live mode".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for channel in Channel::ALL {
            let path = self.paths.get(channel).trim_matches('/');
            if path.is_empty() {
                return Err(AppError::Config(format!("Empty path for {channel}")));
            }
            if !seen.insert(path) {
                return Err(AppError::Config(format!(
                    "Path {path} is used by more than one channel"
                )));
            }
        }

        if self.stats_interval_secs == 0 {
            return Err(AppError::Config(
                "stats_interval_secs must be positive".to_string(),
            ));
        }

        let sim = &self.simulator;
        if !(0.0..=1.0).contains(&sim.malformed_rate) {
            return Err(AppError::Config(format!(
                "simulator.malformed_rate must be within 0.0-1.0, got {}",
                sim.malformed_rate
            )));
        }
        if self.is_simulated()
            && (sim.batch_size == 0
                || sim.sample_rate_hz == 0
                || sim.waveform_interval_ms == 0
                || sim.heart_rate_interval_ms == 0)
        {
            return Err(AppError::Config(
                "simulator intervals, batch_size and sample_rate_hz must be positive".to_string(),
            ));
        }

        self.dashboard.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.mode, OperatingMode::Live);
        assert_eq!(config.paths.ecg, "ecg/latest");
        assert_eq!(config.paths.emg, "emg/latest");
        assert_eq!(config.paths.heart_rate, "heartrate/latest");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = AppConfig::from_toml(
            r#"
            mode = "simulated"

            [paths]
            heart_rate = "patients/7/hr"

            [dashboard]
            port = 9000
            display_min = -1.0

            [simulator]
            malformed_rate = 0.1
            seed = 42
            "#,
        )
        .unwrap();

        assert!(config.is_simulated());
        assert_eq!(config.paths.heart_rate, "patients/7/hr");
        assert_eq!(config.paths.ecg, "ecg/latest");
        assert_eq!(config.dashboard.port, 9000);
        assert_eq!(config.dashboard.display_min, -1.0);
        assert_eq!(config.dashboard.display_max, 1.0);
        assert_eq!(config.simulator.seed, Some(42));
        assert_eq!(config.simulator.batch_size, 125);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_live_mode_requires_url() {
        let config = AppConfig::default();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let config = AppConfig {
            database_url: "https://example-rtdb.firebaseio.com".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_and_empty_paths_rejected() {
        let mut config = AppConfig {
            mode: OperatingMode::Simulated,
            ..Default::default()
        };
        config.paths.emg = "/ecg/latest/".to_string();
        assert!(config.validate().is_err());

        config.paths.emg = "/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_display_range_validated() {
        let mut config = AppConfig {
            mode: OperatingMode::Simulated,
            ..Default::default()
        };
        config.dashboard.display_min = 2.0;
        config.dashboard.display_max = 1.0;

        assert!(matches!(config.validate(), Err(AppError::Dashboard(_))));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(AppConfig::from_toml(r#"mode = "replay""#).is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            AppConfig::from_file("/nonexistent/biomon.toml"),
            Err(AppError::Config(_))
        ));
    }
}
