//! Sample and session data structures
//!
//! Probe outcomes are data, never errors: a failed ping or transfer is a
//! sample with `success == false` and the measured value absent.

use crate::config::MonitorConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transfer direction for speed tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Download,
    Upload,
}

/// One reachability/latency measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingSample {
    pub timestamp: DateTime<Utc>,
    /// Round-trip time in milliseconds (None if the probe failed)
    pub latency_ms: Option<f64>,
    pub success: bool,
}

impl PingSample {
    pub fn ok(timestamp: DateTime<Utc>, latency_ms: f64) -> Self {
        Self {
            timestamp,
            latency_ms: Some(latency_ms),
            success: true,
        }
    }

    pub fn failed(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            latency_ms: None,
            success: false,
        }
    }
}

/// One timed-transfer measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedSample {
    pub timestamp: DateTime<Utc>,
    /// Throughput in megabits per second (None if the transfer failed)
    pub throughput_mbps: Option<f64>,
    pub success: bool,
    pub direction: Direction,
    /// Bytes actually transferred (0 on failure)
    pub bytes: u64,
    /// Wall-clock transfer time in seconds (0 on failure)
    pub elapsed_s: f64,
}

impl SpeedSample {
    /// Derive throughput from a completed transfer:
    /// bits transferred / elapsed seconds / 1e6.
    pub fn ok(timestamp: DateTime<Utc>, direction: Direction, bytes: u64, elapsed_s: f64) -> Self {
        let elapsed_s = elapsed_s.max(1e-6);
        let throughput_mbps = (bytes as f64 * 8.0) / elapsed_s / 1e6;
        Self {
            timestamp,
            throughput_mbps: Some(throughput_mbps),
            success: true,
            direction,
            bytes,
            elapsed_s,
        }
    }

    pub fn failed(timestamp: DateTime<Utc>, direction: Direction) -> Self {
        Self {
            timestamp,
            throughput_mbps: None,
            success: false,
            direction,
            bytes: 0,
            elapsed_s: 0.0,
        }
    }
}

/// A span of consecutive ping failures that met the configured threshold.
/// `end == None` means the interval is still open; at most one interval is
/// open at a time per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutageInterval {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub failure_count: u32,
}

impl OutageInterval {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Duration in seconds, for closed intervals.
    pub fn duration_s(&self) -> Option<f64> {
        self.end
            .map(|end| (end - self.start).num_milliseconds() as f64 / 1000.0)
    }
}

/// Latency aggregates over the successful pings of a session
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LatencyStats {
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

/// Immutable point-in-time copy of accumulated session data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub target_host: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub ping_samples: Vec<PingSample>,
    pub speed_samples: Vec<SpeedSample>,
    pub outage_intervals: Vec<OutageInterval>,
    pub config: MonitorConfig,
}

impl SessionSnapshot {
    /// Successful pings over total pings; 0.0 when no pings were recorded.
    pub fn uptime_ratio(&self) -> f64 {
        if self.ping_samples.is_empty() {
            return 0.0;
        }
        let ok = self.ping_samples.iter().filter(|s| s.success).count();
        ok as f64 / self.ping_samples.len() as f64
    }

    pub fn successful_pings(&self) -> usize {
        self.ping_samples.iter().filter(|s| s.success).count()
    }

    pub fn failed_pings(&self) -> usize {
        self.ping_samples.len() - self.successful_pings()
    }

    /// Min/avg/max over successful ping latencies, if any.
    pub fn latency_stats(&self) -> Option<LatencyStats> {
        let latencies: Vec<f64> = self
            .ping_samples
            .iter()
            .filter_map(|s| s.latency_ms)
            .collect();
        if latencies.is_empty() {
            return None;
        }
        let mut min_ms = f64::INFINITY;
        let mut max_ms = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &l in &latencies {
            min_ms = min_ms.min(l);
            max_ms = max_ms.max(l);
            sum += l;
        }
        Some(LatencyStats {
            min_ms,
            avg_ms: sum / latencies.len() as f64,
            max_ms,
        })
    }

    pub fn interruption_count(&self) -> usize {
        self.outage_intervals.len()
    }

    /// Durations in seconds of the closed outage intervals.
    pub fn interruption_durations(&self) -> Vec<f64> {
        self.outage_intervals
            .iter()
            .filter_map(|o| o.duration_s())
            .collect()
    }

    pub fn total_downtime_s(&self) -> f64 {
        self.interruption_durations().iter().sum()
    }

    /// Session length in seconds; 0.0 while the session is still running.
    pub fn duration_s(&self) -> f64 {
        self.ended_at
            .map(|end| ((end - self.started_at).num_milliseconds() as f64 / 1000.0).max(0.0))
            .unwrap_or(0.0)
    }
}
