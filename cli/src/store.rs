//! JSON session persistence
//!
//! One file per finalized session, `session_<started-at>.json`, holding the
//! flattened sample rows plus the session's configuration. Listing scans the
//! directory rather than keeping a separate index.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use linkwatch_engine::SessionSnapshot;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub target_host: String,
    pub ping_interval: f64,
    pub speed_interval: f64,
    pub outage_threshold: u32,
    pub speed_enabled: bool,
    pub interruptions: u32,
    pub samples: Vec<SampleRecord>,
    pub notes: Option<String>,
}

/// Ping and speed streams merged by timestamp into flat rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRecord {
    pub timestamp: DateTime<Utc>,
    pub ping_milliseconds: Option<f64>,
    pub speed_mbps: Option<f64>,
    pub outage_detected: bool,
}

impl SessionRecord {
    pub fn from_snapshot(snapshot: &SessionSnapshot, notes: Option<String>) -> Self {
        let within_outage = |ts: DateTime<Utc>| {
            snapshot
                .outage_intervals
                .iter()
                .any(|o| ts >= o.start && o.end.is_none_or(|end| ts <= end))
        };

        // Both streams are already timestamp-ordered; a stable sort of the
        // concatenation merges them.
        let mut samples: Vec<SampleRecord> = snapshot
            .ping_samples
            .iter()
            .map(|p| SampleRecord {
                timestamp: p.timestamp,
                ping_milliseconds: p.latency_ms,
                speed_mbps: None,
                outage_detected: within_outage(p.timestamp),
            })
            .chain(snapshot.speed_samples.iter().map(|s| SampleRecord {
                timestamp: s.timestamp,
                ping_milliseconds: None,
                speed_mbps: s.throughput_mbps,
                outage_detected: within_outage(s.timestamp),
            }))
            .collect();
        samples.sort_by_key(|s| s.timestamp);

        Self {
            id: snapshot.session_id.clone(),
            started_at: snapshot.started_at,
            ended_at: snapshot.ended_at,
            target_host: snapshot.target_host.clone(),
            ping_interval: snapshot.config.ping_interval_s,
            speed_interval: snapshot.config.speed_interval_s,
            outage_threshold: snapshot.config.outage_threshold,
            speed_enabled: snapshot.config.speed_enabled,
            interruptions: snapshot.outage_intervals.len() as u32,
            samples,
            notes,
        }
    }
}

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist a finalized snapshot. Returns the path written.
    pub fn save(&self, snapshot: &SessionSnapshot, notes: Option<String>) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create sessions directory {:?}", self.dir))?;

        let record = SessionRecord::from_snapshot(snapshot, notes);
        let path = self.dir.join(format!("session_{}.json", record.id));
        let json = serde_json::to_string_pretty(&record)
            .context("Failed to serialize session record")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write session file {path:?}"))?;
        debug!("Wrote session record to {path:?}");
        Ok(path)
    }

    /// All stored sessions, oldest first.
    pub fn list(&self) -> Result<Vec<SessionRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read sessions directory {:?}", self.dir))?
        {
            let path = entry?.path();
            if !is_session_file(&path) {
                continue;
            }
            match read_record(&path) {
                Ok(record) => records.push(record),
                Err(e) => debug!("Skipping unreadable session file {path:?}: {e}"),
            }
        }
        records.sort_by_key(|r| r.started_at);
        Ok(records)
    }
}

fn is_session_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("session_"))
}

fn read_record(path: &Path) -> Result<SessionRecord> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
