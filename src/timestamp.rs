//! Timestamp extraction and the `1h2m3s` duration grammar.
//!
//! Gateway log lines embed a UTC timestamp such as
//! `2026-02-07T02:28:57.903Z` somewhere in the text. Rate-limit messages
//! carry a `reset after 14h19m18s` clause using a compact duration grammar
//! that is also used for quota resets.

use std::borrow::Cow;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};

use crate::patterns;

/// Errors produced when parsing a compact duration string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    /// The input was empty after trimming.
    #[error("duration is empty")]
    Empty,

    /// The input does not follow the `(\d+h)?(\d+m)?(\d+s)?` grammar.
    #[error("malformed duration: {0:?}")]
    Malformed(String),

    /// Every unit was zero or absent.
    #[error("duration has no non-zero unit: {0:?}")]
    Zero(String),

    /// A unit value does not fit in the supported range.
    #[error("duration out of range: {0:?}")]
    OutOfRange(String),
}

/// A parsed `reset after` hint: the duration plus the raw text it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetHint {
    /// Parsed duration until the limit resets.
    pub after: TimeDelta,
    /// The duration exactly as written in the log, e.g. `45m`.
    pub raw: String,
}

/// Extract the first UTC timestamp embedded in a log line.
///
/// Returns `None` when the line has no timestamp or it is not a valid
/// calendar instant (e.g. `2026-02-30T00:00:00Z`).
pub fn extract_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let found = patterns::TIMESTAMP.as_ref()?.find(line)?;
    let raw = found.as_str().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// The line with its first embedded timestamp removed.
///
/// Message patterns run on this so digits inside the timestamp (e.g. the
/// `.429` in `10:00:00.429Z`) are never read as part of the message.
pub fn strip_timestamp(line: &str) -> Cow<'_, str> {
    match patterns::TIMESTAMP.as_ref() {
        Some(re) => re.replace(line, ""),
        None => Cow::Borrowed(line),
    }
}

/// Parse a compact duration such as `14h19m18s`, `17m16s`, `3h` or `30s`.
///
/// Unit letters are case-insensitive, units must appear in h/m/s order, and
/// at least one unit must be non-zero.
///
/// # Errors
///
/// Returns a [`DurationError`] describing why the input was rejected.
pub fn parse_hms_duration(input: &str) -> Result<TimeDelta, DurationError> {
    let raw = input.trim().to_ascii_lowercase();
    if raw.is_empty() {
        return Err(DurationError::Empty);
    }

    let caps = patterns::captures(&patterns::DURATION, &raw)
        .ok_or_else(|| DurationError::Malformed(input.to_owned()))?;

    let out_of_range = || DurationError::OutOfRange(input.to_owned());
    let unit = |name: &str| -> Result<i64, DurationError> {
        caps.name(name)
            .map_or(Ok(0), |m| m.as_str().parse::<i64>().map_err(|_| out_of_range()))
    };

    let (hours, minutes, seconds) = (unit("h")?, unit("m")?, unit("s")?);
    if hours == 0 && minutes == 0 && seconds == 0 {
        return Err(DurationError::Zero(input.to_owned()));
    }

    let parts = [
        TimeDelta::try_hours(hours),
        TimeDelta::try_minutes(minutes),
        TimeDelta::try_seconds(seconds),
    ];
    parts
        .into_iter()
        .try_fold(TimeDelta::zero(), |acc, part| acc.checked_add(&part?))
        .ok_or_else(out_of_range)
}

/// Find a `reset after <duration>` or `quota will reset after <duration>`
/// clause in free text.
///
/// An unparseable duration counts as no hint at all, so callers fall back
/// to the kind's default sticky window.
pub fn reset_after_from_text(text: &str) -> Option<ResetHint> {
    let caps = patterns::captures(&patterns::RESET_AFTER, text)
        .or_else(|| patterns::captures(&patterns::QUOTA_RESET, text))?;
    let raw = caps.name("after")?.as_str().trim();
    let after = parse_hms_duration(raw).ok()?;
    Some(ResetHint {
        after,
        raw: raw.to_owned(),
    })
}
