//! linkwatch engine - connection-monitoring core
//!
//! Runs concurrent probe loops against a target host, classifies outages
//! from consecutive-failure streaks, measures throughput from timed
//! transfers and records everything per session behind a thread-safe
//! recorder. Presentation and persistence live outside this crate; they
//! consume [`SessionSnapshot`] values and the [`MonitoringService`] event
//! channel.

mod clock;
mod config;
mod error;
mod outage;
mod probe;
mod recorder;
mod sample;
mod service;

pub use clock::ProbeClock;
pub use config::{MIN_PING_INTERVAL_S, MIN_SPEED_INTERVAL_S, MonitorConfig};
pub use error::MonitorError;
pub use outage::{OutageEvent, OutageTracker};
pub use probe::{HttpSpeedTester, IcmpPinger, Pinger, SpeedTester};
pub use recorder::SessionRecorder;
pub use sample::{
    Direction, LatencyStats, OutageInterval, PingSample, SessionSnapshot, SpeedSample,
};
pub use service::{MonitorEvent, MonitoringService};
