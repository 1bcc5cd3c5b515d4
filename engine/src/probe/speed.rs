//! HTTP(S) speed probe
//!
//! Elapsed time is measured from request dispatch to the last byte, so
//! connection setup is included in the throughput denominator. That lowers
//! absolute accuracy slightly but stays consistent across samples.

use super::SpeedTester;
use crate::error::MonitorError;
use crate::sample::{Direction, SpeedSample};
use async_trait::async_trait;
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct HttpSpeedTester {
    http: reqwest::Client,
    /// When set, downloads read for this long instead of stopping at the
    /// size hint.
    transfer_duration: Option<Duration>,
}

impl HttpSpeedTester {
    /// `transfer_timeout` bounds the whole request, connection setup
    /// included.
    pub fn new(transfer_timeout: Duration) -> Result<Self, MonitorError> {
        let http = reqwest::Client::builder()
            .timeout(transfer_timeout)
            .build()
            .map_err(|e| MonitorError::ProbeInit(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            transfer_duration: None,
        })
    }

    /// Switch downloads to a continuous, duration-bounded read. Smooths out
    /// per-request jitter on fast links at the cost of more transferred data.
    pub fn with_transfer_duration(mut self, duration: Duration) -> Self {
        self.transfer_duration = Some(duration);
        self
    }

    /// Stream the response, counting bytes until the configured bound
    /// (size hint or transfer duration) or EOF.
    async fn download(&self, endpoint: &str, size_hint: u64) -> Result<(u64, f64), reqwest::Error> {
        let start = Instant::now();
        let deadline = self.transfer_duration.map(|d| start + d);
        let mut response = self.http.get(endpoint).send().await?.error_for_status()?;
        let mut bytes: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            bytes += chunk.len() as u64;
            let done = match deadline {
                Some(deadline) => Instant::now() >= deadline,
                None => bytes >= size_hint,
            };
            if done {
                break;
            }
        }
        Ok((bytes, start.elapsed().as_secs_f64()))
    }

    async fn upload(&self, endpoint: &str, size_hint: u64) -> Result<(u64, f64), reqwest::Error> {
        let body = vec![0u8; size_hint as usize];
        let start = Instant::now();
        self.http
            .post(endpoint)
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok((size_hint, start.elapsed().as_secs_f64()))
    }
}

#[async_trait]
impl SpeedTester for HttpSpeedTester {
    async fn probe(&self, endpoint: &str, direction: Direction, size_hint: u64) -> SpeedSample {
        let timestamp = Utc::now();
        let result = match direction {
            Direction::Download => self.download(endpoint, size_hint).await,
            Direction::Upload => self.upload(endpoint, size_hint).await,
        };
        match result {
            Ok((bytes, elapsed_s)) => {
                let sample = SpeedSample::ok(timestamp, direction, bytes, elapsed_s);
                debug!(
                    "speed {direction:?} {bytes} bytes in {elapsed_s:.3}s -> {:.2} Mbps",
                    sample.throughput_mbps.unwrap_or(0.0)
                );
                sample
            }
            Err(e) => {
                debug!("speed {direction:?} against {endpoint} failed: {e}");
                SpeedSample::failed(timestamp, direction)
            }
        }
    }
}
