//! Reading gateway logs, the watchdog audit trail and JSON state files.
//!
//! Every reader here is tolerant: a missing file is an empty input, an
//! unreadable file is logged and treated as empty, and malformed records are
//! skipped one by one. Uses synchronous `std::fs` reads since these are
//! quick local operations.

use std::collections::HashSet;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::GuardianPaths;
use crate::patterns;
use crate::restarts::WatchdogEvent;
use crate::timestamp::extract_timestamp;

const MAX_LINE_LEN: usize = 1_048_576; // 1 MB safety limit.

/// Runtime logs the gateway rotates daily, e.g. `openclaw-2026-02-07.log`.
const RUNTIME_LOG_PREFIX: &str = "openclaw-";
const RUNTIME_LOG_SUFFIX: &str = ".log";
/// Newest runtime logs picked up from the runtime log directory.
const RUNTIME_LOG_FALLBACK_COUNT: usize = 2;

/// Reads the gateway's log and state files.
pub struct Watcher {
    paths: GuardianPaths,
}

impl Watcher {
    /// Create a watcher over the given paths.
    pub fn new(paths: GuardianPaths) -> Self {
        Self { paths }
    }

    /// The paths this watcher reads.
    pub fn paths(&self) -> &GuardianPaths {
        &self.paths
    }

    /// Timestamped gateway log lines at or after `since`.
    pub fn gateway_lines(&self, since: DateTime<Utc>) -> Vec<String> {
        read_recent_lines(&self.paths.gateway_log, since)
    }

    /// Timestamped error log lines at or after `since`.
    pub fn error_lines(&self, since: DateTime<Utc>) -> Vec<String> {
        read_recent_lines(&self.paths.error_log, since)
    }

    /// Runtime log files, as announced by the gateway or found on disk.
    pub fn runtime_log_paths(&self, gateway_lines: &[String]) -> Vec<PathBuf> {
        resolve_runtime_log_paths(gateway_lines, &self.paths.runtime_log_dir)
    }

    /// Timestamped lines at or after `since` from each file, concatenated.
    pub fn lines_from(&self, files: &[PathBuf], since: DateTime<Utc>) -> Vec<String> {
        files
            .iter()
            .flat_map(|path| read_recent_lines(path, since))
            .collect()
    }

    /// Watchdog audit records at or after `since`.
    pub fn watchdog_events(&self, since: DateTime<Utc>) -> Vec<WatchdogEvent> {
        read_watchdog_audit(&self.paths.watchdog_audit, since)
    }

    /// Whether the watchdog has ever written an audit trail.
    pub fn audit_present(&self) -> bool {
        self.paths.watchdog_audit.exists()
    }

    /// The gateway config, or `Value::Null` if missing or invalid.
    pub fn gateway_config(&self) -> Value {
        read_json_file(&self.paths.gateway_config).unwrap_or(Value::Null)
    }

    /// The scheduled jobs file, if present and valid.
    pub fn cron_jobs(&self) -> Option<Value> {
        read_json_file(&self.paths.cron_jobs)
    }
}

/// Read the lines of `path` whose embedded timestamp is at or after `since`.
///
/// Lines without a timestamp are dropped. A missing file yields no lines; a
/// file that cannot be read is logged and yields no lines.
pub fn read_recent_lines(path: &Path, since: DateTime<Utc>) -> Vec<String> {
    if !path.exists() {
        return Vec::new();
    }
    match try_read_recent_lines(path, since) {
        Ok(lines) => lines,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read log file");
            Vec::new()
        }
    }
}

fn try_read_recent_lines(path: &Path, since: DateTime<Utc>) -> anyhow::Result<Vec<String>> {
    let mut lines = Vec::new();
    for_each_line(path, |line| {
        if extract_timestamp(line).is_some_and(|ts| ts >= since) {
            lines.push(line.to_owned());
        }
    })?;
    debug!(path = %path.display(), count = lines.len(), "read recent lines");
    Ok(lines)
}

/// Call `f` with every line of `path`, without its line terminator.
///
/// Invalid UTF-8 is replaced rather than rejected, and lines above the
/// safety limit are skipped.
fn for_each_line(path: &Path, mut f: impl FnMut(&str)) -> anyhow::Result<()> {
    let file =
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let bytes_read = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("failed to read line from {}", path.display()))?;
        if bytes_read == 0 {
            break;
        }
        if buf.len() > MAX_LINE_LEN {
            continue;
        }
        let line = String::from_utf8_lossy(&buf);
        f(line.trim_end_matches(['\n', '\r']));
    }
    Ok(())
}

/// Find the runtime logs to scan.
///
/// The most recent `log file: /path` announcement in the gateway log comes
/// first, then the newest `openclaw-*.log` files in `runtime_dir`.
/// Duplicates are dropped, order is kept.
pub fn resolve_runtime_log_paths(gateway_lines: &[String], runtime_dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();

    let announced = gateway_lines
        .iter()
        .rev()
        .find(|line| line.contains("log file:"))
        .and_then(|line| patterns::capture_group(&patterns::LOG_FILE, line, "path"));
    if let Some(path) = announced {
        found.push(PathBuf::from(path));
    }

    found.extend(newest_runtime_logs(runtime_dir, RUNTIME_LOG_FALLBACK_COUNT));

    let mut seen = HashSet::new();
    found.retain(|path| seen.insert(path.clone()));
    found
}

/// The `count` most recently modified `openclaw-*.log` files in `dir`.
fn newest_runtime_logs(dir: &Path, count: usize) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut logs: Vec<(PathBuf, std::time::SystemTime)> = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_name().to_str().is_some_and(|name| {
                name.starts_with(RUNTIME_LOG_PREFIX) && name.ends_with(RUNTIME_LOG_SUFFIX)
            })
        })
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((entry.path(), modified))
        })
        .collect();

    logs.sort_by(|a, b| b.1.cmp(&a.1));
    logs.into_iter().take(count).map(|(path, _)| path).collect()
}

/// Read watchdog audit records at or after `since`.
///
/// Malformed lines are skipped individually.
pub fn read_watchdog_audit(path: &Path, since: DateTime<Utc>) -> Vec<WatchdogEvent> {
    if !path.exists() {
        return Vec::new();
    }

    let mut events = Vec::new();
    let result = for_each_line(path, |line| {
        if let Some(event) = WatchdogEvent::parse_line(line) {
            if event.timestamp >= since {
                events.push(event);
            }
        }
    });

    match result {
        Ok(()) => events,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read watchdog audit");
            Vec::new()
        }
    }
}

/// Read and parse a JSON file, or `None` if it is missing or invalid.
pub fn read_json_file(path: &Path) -> Option<Value> {
    let contents = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring invalid JSON file");
            None
        }
    }
}
