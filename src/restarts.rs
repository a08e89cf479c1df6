//! Gateway restart timeline.
//!
//! Restart and crash signals are detected in the gateway, error and runtime
//! logs. A single restart usually leaves several signals a few seconds
//! apart, so candidates close in time are merged. Restarts that line up with
//! a `gateway_restart` entry in the watchdog's audit trail are attributed to
//! the watchdog.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::timestamp::extract_timestamp;

/// Audit record type the watchdog writes when it restarts the gateway.
pub const WATCHDOG_RESTART_TYPE: &str = "gateway_restart";

const MERGE_WINDOW_SECS: i64 = 90;
const ATTRIBUTION_WINDOW_SECS: i64 = 120;

/// Why the gateway restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RestartReason {
    /// SIGUSR1 after a configuration change.
    #[serde(rename = "config-change signal")]
    ConfigChange,
    /// SIGTERM from the service manager.
    #[serde(rename = "graceful shutdown signal")]
    GracefulShutdown,
    /// Uncaught exception or reconnect exhaustion.
    #[serde(rename = "crash/uncaught-exception")]
    Crash,
    /// Restart issued by the watchdog.
    #[serde(rename = "watchdog self-heal")]
    WatchdogSelfHeal,
}

impl RestartReason {
    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::ConfigChange => "config-change signal",
            Self::GracefulShutdown => "graceful shutdown signal",
            Self::Crash => "crash/uncaught-exception",
            Self::WatchdogSelfHeal => "watchdog self-heal",
        }
    }

    /// Detect a restart signal in a log line.
    pub fn detect(line: &str) -> Option<Self> {
        let lowered = line.to_lowercase();
        if lowered.contains("received sigusr1; restarting") {
            Some(Self::ConfigChange)
        } else if lowered.contains("received sigterm; shutting down") {
            Some(Self::GracefulShutdown)
        } else if lowered.contains("uncaught exception") || lowered.contains("max reconnect attempts") {
            Some(Self::Crash)
        } else {
            None
        }
    }
}

impl std::fmt::Display for RestartReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One restart on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestartRecord {
    /// When the restart happened.
    pub timestamp: DateTime<Utc>,
    /// Best explanation for it.
    pub reason: RestartReason,
}

/// One record from the watchdog audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchdogEvent {
    /// When the watchdog logged it.
    pub timestamp: DateTime<Utc>,
    /// Record type, e.g. `gateway_restart`.
    pub kind: Option<String>,
}

#[derive(Deserialize)]
struct RawAuditRecord {
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl WatchdogEvent {
    /// Parse one JSON line of the audit trail.
    ///
    /// Returns `None` for malformed JSON or a missing or unparseable
    /// timestamp.
    pub fn parse_line(raw: &str) -> Option<Self> {
        let record: RawAuditRecord = serde_json::from_str(raw.trim()).ok()?;
        let timestamp = match record.timestamp? {
            serde_json::Value::String(s) => parse_audit_timestamp(&s)?,
            _ => return None,
        };
        Some(Self {
            timestamp,
            kind: record.kind,
        })
    }

    /// Whether this record is a watchdog-issued gateway restart.
    pub fn is_restart(&self) -> bool {
        self.kind.as_deref() == Some(WATCHDOG_RESTART_TYPE)
    }
}

/// Parse an ISO-8601 audit timestamp.
///
/// Offsets are honoured; timestamps without one are taken as UTC.
pub fn parse_audit_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Merges restart signals and attributes them to the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartEventMerger {
    merge_window: TimeDelta,
    attribution_window: TimeDelta,
}

impl Default for RestartEventMerger {
    fn default() -> Self {
        Self {
            merge_window: TimeDelta::seconds(MERGE_WINDOW_SECS),
            attribution_window: TimeDelta::seconds(ATTRIBUTION_WINDOW_SECS),
        }
    }
}

impl RestartEventMerger {
    /// Build the restart timeline, newest first.
    pub fn analyze<I, S>(&self, lines: I, watchdog: &[WatchdogEvent]) -> Vec<RestartRecord>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let candidates = candidates(lines);
        let merged = self.merge(candidates);
        self.attribute(merged, watchdog)
    }

    /// Collapse candidates within the merge window of the last kept one.
    ///
    /// Candidates are processed newest first. A crash folded into a kept
    /// record replaces that record's reason.
    pub fn merge(&self, mut candidates: Vec<RestartRecord>) -> Vec<RestartRecord> {
        candidates.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let mut merged: Vec<RestartRecord> = Vec::new();
        for candidate in candidates {
            if let Some(kept) = merged.last_mut() {
                if abs_delta(kept.timestamp, candidate.timestamp) <= self.merge_window {
                    if candidate.reason == RestartReason::Crash {
                        kept.reason = RestartReason::Crash;
                    }
                    continue;
                }
            }
            merged.push(candidate);
        }
        merged
    }

    /// Relabel restarts that match a watchdog restart within the window.
    pub fn attribute(&self, merged: Vec<RestartRecord>, watchdog: &[WatchdogEvent]) -> Vec<RestartRecord> {
        let restarts: Vec<DateTime<Utc>> = watchdog
            .iter()
            .filter(|event| event.is_restart())
            .map(|event| event.timestamp)
            .collect();

        merged
            .into_iter()
            .map(|mut record| {
                let corroborated = restarts
                    .iter()
                    .any(|&at| abs_delta(at, record.timestamp) <= self.attribution_window);
                if corroborated {
                    debug!(at = %record.timestamp, "restart attributed to watchdog");
                    record.reason = RestartReason::WatchdogSelfHeal;
                }
                record
            })
            .collect()
    }
}

/// Every timestamped restart signal in `lines`, in input order.
pub fn candidates<I, S>(lines: I) -> Vec<RestartRecord>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| {
            let line = line.as_ref();
            let reason = RestartReason::detect(line)?;
            let timestamp = extract_timestamp(line)?;
            Some(RestartRecord { timestamp, reason })
        })
        .collect()
}

fn abs_delta(a: DateTime<Utc>, b: DateTime<Utc>) -> TimeDelta {
    a.signed_duration_since(b).abs()
}
