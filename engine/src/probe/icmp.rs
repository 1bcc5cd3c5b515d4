//! ICMP ping probe

use super::Pinger;
use crate::error::MonitorError;
use crate::sample::PingSample;
use async_trait::async_trait;
use chrono::Utc;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use surge_ping::{Client, Config as PingConfig, PingIdentifier, PingSequence};
use tracing::debug;

pub struct IcmpPinger {
    client: Client,
    sequence: AtomicU16,
}

impl IcmpPinger {
    pub fn new() -> Result<Self, MonitorError> {
        let client = Client::new(&PingConfig::default()).map_err(|e| {
            MonitorError::ProbeInit(format!(
                "failed to create ICMP client (CAP_NET_RAW required): {e}"
            ))
        })?;
        Ok(Self {
            client,
            sequence: AtomicU16::new(0),
        })
    }

    async fn resolve(&self, host: &str) -> Option<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Some(ip);
        }
        match tokio::net::lookup_host(format!("{host}:0")).await {
            Ok(mut addrs) => addrs.next().map(|a| a.ip()),
            Err(e) => {
                debug!("DNS lookup for {host} failed: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl Pinger for IcmpPinger {
    async fn probe(&self, host: &str, timeout: Duration) -> PingSample {
        let timestamp = Utc::now();

        let Some(target) = self.resolve(host).await else {
            return PingSample::failed(timestamp);
        };

        let payload = [0u8; 56]; // standard ping payload size
        let sequence = PingSequence(self.sequence.fetch_add(1, Ordering::Relaxed));
        let mut pinger = self.client.pinger(target, PingIdentifier(rand::random())).await;

        match tokio::time::timeout(timeout, pinger.ping(sequence, &payload)).await {
            Ok(Ok((_packet, rtt))) => {
                let latency_ms = rtt.as_secs_f64() * 1000.0;
                debug!("ICMP {host} -> {latency_ms:.2}ms");
                PingSample::ok(timestamp, latency_ms)
            }
            Ok(Err(e)) => {
                debug!("ICMP {host} -> error: {e}");
                PingSample::failed(timestamp)
            }
            Err(_) => {
                debug!("ICMP {host} -> timeout after {timeout:?}");
                PingSample::failed(timestamp)
            }
        }
    }
}
