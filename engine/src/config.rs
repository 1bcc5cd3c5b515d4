//! Monitoring configuration
//!
//! An immutable configuration value passed into `MonitoringService::start()`.
//! Changing settings mid-session is not supported; stop and start again.

use crate::error::MonitorError;
use crate::sample::Direction;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum allowed ping cadence in seconds.
pub const MIN_PING_INTERVAL_S: f64 = 0.5;

/// Minimum allowed speed-test cadence in seconds.
pub const MIN_SPEED_INTERVAL_S: f64 = 10.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Host to ping (IP address or hostname)
    pub target_host: String,

    /// Seconds between ping probes (must be > 0.5)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_s: f64,

    /// Per-ping timeout in seconds (must be < ping_interval_s)
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_s: f64,

    /// Seconds between speed tests (must be >= 10)
    #[serde(default = "default_speed_interval")]
    pub speed_interval_s: f64,

    /// Consecutive ping failures needed to open an outage interval
    #[serde(default = "default_outage_threshold")]
    pub outage_threshold: u32,

    /// Whether the speed-test cadence runs at all
    #[serde(default = "default_true")]
    pub speed_enabled: bool,

    /// HTTP(S) endpoint used for timed transfers
    #[serde(default = "default_speed_endpoint")]
    pub speed_endpoint: String,

    /// Transfer direction for speed tests
    #[serde(default)]
    pub speed_direction: Direction,

    /// Approximate number of bytes per timed transfer
    #[serde(default = "default_speed_size_hint")]
    pub speed_size_hint: u64,

    /// When > 0, each download reads continuously for this many seconds
    /// instead of stopping at the size hint
    #[serde(default)]
    pub speed_test_duration_s: f64,
}

fn default_ping_interval() -> f64 {
    2.0
}

fn default_ping_timeout() -> f64 {
    1.0
}

fn default_speed_interval() -> f64 {
    60.0
}

fn default_outage_threshold() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_speed_endpoint() -> String {
    "https://speed.cloudflare.com/__down?bytes=524288".to_string()
}

fn default_speed_size_hint() -> u64 {
    512 * 1024
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target_host: "1.1.1.1".to_string(),
            ping_interval_s: default_ping_interval(),
            ping_timeout_s: default_ping_timeout(),
            speed_interval_s: default_speed_interval(),
            outage_threshold: default_outage_threshold(),
            speed_enabled: default_true(),
            speed_endpoint: default_speed_endpoint(),
            speed_direction: Direction::default(),
            speed_size_hint: default_speed_size_hint(),
            speed_test_duration_s: 0.0,
        }
    }
}

impl MonitorConfig {
    /// Check all constraints. Called by `MonitoringService::start()` before
    /// any clock is launched.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.target_host.trim().is_empty() {
            return Err(MonitorError::InvalidConfig(
                "target_host must not be empty".to_string(),
            ));
        }
        if self.ping_interval_s <= MIN_PING_INTERVAL_S {
            return Err(MonitorError::InvalidConfig(format!(
                "ping_interval_s must be greater than {MIN_PING_INTERVAL_S}, got {}",
                self.ping_interval_s
            )));
        }
        if self.ping_timeout_s <= 0.0 || self.ping_timeout_s >= self.ping_interval_s {
            return Err(MonitorError::InvalidConfig(format!(
                "ping_timeout_s must be positive and less than ping_interval_s, got {}",
                self.ping_timeout_s
            )));
        }
        if self.speed_enabled {
            if self.speed_interval_s < MIN_SPEED_INTERVAL_S {
                return Err(MonitorError::InvalidConfig(format!(
                    "speed_interval_s must be at least {MIN_SPEED_INTERVAL_S}, got {}",
                    self.speed_interval_s
                )));
            }
            if self.speed_endpoint.trim().is_empty() {
                return Err(MonitorError::InvalidConfig(
                    "speed_endpoint must not be empty when speed tests are enabled".to_string(),
                ));
            }
            if self.speed_test_duration_s < 0.0
                || self.speed_test_duration_s >= self.speed_interval_s
            {
                return Err(MonitorError::InvalidConfig(format!(
                    "speed_test_duration_s must be non-negative and below speed_interval_s, got {}",
                    self.speed_test_duration_s
                )));
            }
        }
        if self.outage_threshold < 1 {
            return Err(MonitorError::InvalidConfig(
                "outage_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs_f64(self.ping_interval_s)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.ping_timeout_s)
    }

    pub fn speed_interval(&self) -> Duration {
        Duration::from_secs_f64(self.speed_interval_s)
    }
}
