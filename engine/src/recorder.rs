//! Thread-safe session recording
//!
//! All probe outcomes and outage events for the active session funnel into a
//! single recorder guarded by one mutex. Writes are append-only; reads go
//! through [`SessionRecorder::snapshot`], which copies under the lock so a
//! reader never observes a partially updated sample list. After
//! [`SessionRecorder::finalize`] every write is rejected with
//! [`MonitorError::SessionClosed`].

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::outage::OutageEvent;
use crate::sample::{OutageInterval, PingSample, SessionSnapshot, SpeedSample};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct SessionRecorder {
    inner: Mutex<Inner>,
}

struct Inner {
    session_id: String,
    config: MonitorConfig,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    pings: Vec<PingSample>,
    speeds: Vec<SpeedSample>,
    outages: Vec<OutageInterval>,
}

impl SessionRecorder {
    pub fn new(config: MonitorConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                session_id: started_at.format("%Y%m%dT%H%M%SZ").to_string(),
                config,
                started_at,
                ended_at: None,
                pings: Vec::new(),
                speeds: Vec::new(),
                outages: Vec::new(),
            }),
        }
    }

    fn locked(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn session_id(&self) -> String {
        self.locked().session_id.clone()
    }

    pub fn record_ping(&self, sample: PingSample) -> Result<(), MonitorError> {
        let mut inner = self.locked();
        if inner.ended_at.is_some() {
            return Err(MonitorError::SessionClosed);
        }
        inner.pings.push(sample);
        Ok(())
    }

    pub fn record_speed(&self, sample: SpeedSample) -> Result<(), MonitorError> {
        let mut inner = self.locked();
        if inner.ended_at.is_some() {
            return Err(MonitorError::SessionClosed);
        }
        inner.speeds.push(sample);
        Ok(())
    }

    /// `Started` appends an open interval; `Ended` closes the last open one.
    pub fn record_outage_event(&self, event: OutageEvent) -> Result<(), MonitorError> {
        let mut inner = self.locked();
        if inner.ended_at.is_some() {
            return Err(MonitorError::SessionClosed);
        }
        match event {
            OutageEvent::Started(interval) => inner.outages.push(interval),
            OutageEvent::Ended(interval) => {
                if let Some(open) = inner.outages.iter_mut().rev().find(|o| o.is_open()) {
                    *open = interval;
                } else {
                    inner.outages.push(interval);
                }
            }
        }
        Ok(())
    }

    /// Deep immutable copy of the live state. Copy-on-read; blocks writers
    /// only for the duration of the copy.
    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.locked();
        SessionSnapshot {
            session_id: inner.session_id.clone(),
            target_host: inner.config.target_host.clone(),
            started_at: inner.started_at,
            ended_at: inner.ended_at,
            ping_samples: inner.pings.clone(),
            speed_samples: inner.speeds.clone(),
            outage_intervals: inner.outages.clone(),
            config: inner.config.clone(),
        }
    }

    /// Mark the session ended and return the terminal snapshot. May be
    /// called once; later calls and writes get `SessionClosed`.
    pub fn finalize(&self, ended_at: DateTime<Utc>) -> Result<SessionSnapshot, MonitorError> {
        {
            let mut inner = self.locked();
            if inner.ended_at.is_some() {
                return Err(MonitorError::SessionClosed);
            }
            inner.ended_at = Some(ended_at);
        }
        Ok(self.snapshot())
    }

    pub fn is_closed(&self) -> bool {
        self.locked().ended_at.is_some()
    }
}
