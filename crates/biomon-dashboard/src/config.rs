//! Dashboard configuration.

use serde::{Deserialize, Serialize};

use crate::chart::DisplayRange;
use crate::error::{DashboardError, DashboardResult};

/// Dashboard server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Enable dashboard server.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Interval in milliseconds between WebSocket change checks.
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    /// Maximum concurrent WebSocket connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Lower bound of the chart's vertical axis.
    #[serde(default = "default_display_min")]
    pub display_min: f64,
    /// Upper bound of the chart's vertical axis.
    #[serde(default = "default_display_max")]
    pub display_max: f64,
    /// Allow cross-origin requests to the API.
    #[serde(default)]
    pub cors: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_port() -> u16 {
    8080
}

fn default_update_interval_ms() -> u64 {
    100
}

fn default_max_connections() -> usize {
    10
}

fn default_display_min() -> f64 {
    0.0
}

fn default_display_max() -> f64 {
    1.0
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            port: default_port(),
            update_interval_ms: default_update_interval_ms(),
            max_connections: default_max_connections(),
            display_min: default_display_min(),
            display_max: default_display_max(),
            cors: false,
        }
    }
}

impl DashboardConfig {
    pub fn display_range(&self) -> DisplayRange {
        DisplayRange::new(self.display_min, self.display_max)
    }

    pub fn validate(&self) -> DashboardResult<()> {
        // NaN bounds fail too
        if !(self.display_min < self.display_max) {
            return Err(DashboardError::InvalidConfig(format!(
                "display_min ({}) must be below display_max ({})",
                self.display_min, self.display_max
            )));
        }
        if self.update_interval_ms == 0 {
            return Err(DashboardError::InvalidConfig(
                "update_interval_ms must be positive".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(DashboardError::InvalidConfig(
                "max_connections must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DashboardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.display_range(), DisplayRange::new(0.0, 1.0));
    }

    #[test]
    fn test_inverted_display_range_rejected() {
        let config = DashboardConfig {
            display_min: 5.0,
            display_max: 5.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DashboardError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_nan_display_range_rejected() {
        let config = DashboardConfig {
            display_min: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
