//! Probe implementations
//!
//! Probes are stateless between calls and never raise for ordinary network
//! failure; a failed measurement comes back as a sample with
//! `success == false`.

mod icmp;
mod speed;

pub use icmp::IcmpPinger;
pub use speed::HttpSpeedTester;

use crate::sample::{Direction, PingSample, SpeedSample};
use async_trait::async_trait;
use std::time::Duration;

/// One reachability/latency measurement against a target host.
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn probe(&self, host: &str, timeout: Duration) -> PingSample;
}

/// One timed transfer of approximately `size_hint` bytes.
#[async_trait]
pub trait SpeedTester: Send + Sync {
    async fn probe(&self, endpoint: &str, direction: Direction, size_hint: u64) -> SpeedSample;
}
