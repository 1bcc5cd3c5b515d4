//! Outage detection from consecutive ping failures
//!
//! An interval opens only once a failure streak reaches the configured
//! threshold, so isolated single-packet loss is never flagged. It closes on
//! the very next success, keeping the reported duration tight. The interval
//! start is backdated to the first failure of the streak.

use crate::sample::{OutageInterval, PingSample};
use chrono::{DateTime, Utc};

/// Emitted by [`OutageTracker::observe`] when an interval opens or closes.
#[derive(Debug, Clone)]
pub enum OutageEvent {
    Started(OutageInterval),
    Ended(OutageInterval),
}

pub struct OutageTracker {
    threshold: u32,
    consecutive_failures: u32,
    streak_started_at: Option<DateTime<Utc>>,
    open: Option<OutageInterval>,
}

impl OutageTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
            streak_started_at: None,
            open: None,
        }
    }

    /// Feed one ping outcome through the tracker.
    pub fn observe(&mut self, sample: &PingSample) -> Option<OutageEvent> {
        if sample.success {
            self.consecutive_failures = 0;
            self.streak_started_at = None;
            return self.open.take().map(|mut interval| {
                interval.end = Some(sample.timestamp);
                OutageEvent::Ended(interval)
            });
        }

        self.consecutive_failures += 1;
        if self.streak_started_at.is_none() {
            self.streak_started_at = Some(sample.timestamp);
        }

        if let Some(open) = self.open.as_mut() {
            // Interval keeps growing; no new event.
            open.failure_count = self.consecutive_failures;
            None
        } else if self.consecutive_failures == self.threshold {
            let interval = OutageInterval {
                start: self.streak_started_at.unwrap_or(sample.timestamp),
                end: None,
                failure_count: self.consecutive_failures,
            };
            self.open = Some(interval.clone());
            Some(OutageEvent::Started(interval))
        } else {
            None
        }
    }

    /// Truncate an open interval at session stop instead of discarding it.
    pub fn close_at_session_end(&mut self, timestamp: DateTime<Utc>) -> Option<OutageEvent> {
        self.consecutive_failures = 0;
        self.streak_started_at = None;
        self.open.take().map(|mut interval| {
            interval.end = Some(timestamp);
            OutageEvent::Ended(interval)
        })
    }

    pub fn open_interval(&self) -> Option<&OutageInterval> {
        self.open.as_ref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
