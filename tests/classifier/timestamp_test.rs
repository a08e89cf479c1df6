//! Tests for timestamp extraction and the compact duration grammar.

use chrono::{TimeDelta, TimeZone, Timelike, Utc};
use guardian::timestamp::{
    extract_timestamp, parse_hms_duration, reset_after_from_text, strip_timestamp, DurationError,
};

#[test]
fn extracts_fractional_timestamp() {
    let ts = extract_timestamp("2026-02-07T02:28:57.903Z [gateway] ready").expect("timestamp");
    let expected = Utc
        .with_ymd_and_hms(2026, 2, 7, 2, 28, 57)
        .single()
        .expect("valid time");
    assert_eq!(ts.with_nanosecond(0), Some(expected));
    assert_eq!(ts.timestamp_subsec_millis(), 903);
}

#[test]
fn extracts_timestamp_mid_line() {
    let ts = extract_timestamp("[warn] at 2026-02-07T02:28:57Z something").expect("timestamp");
    assert_eq!(ts.minute(), 28);
}

#[test]
fn missing_or_invalid_timestamp_is_none() {
    assert!(extract_timestamp("no time here").is_none());
    assert!(extract_timestamp("2026-02-07 02:28:57 local").is_none());
    assert!(extract_timestamp("2026-02-30T00:00:00Z impossible date").is_none());
}

#[test]
fn strip_removes_only_the_timestamp() {
    assert_eq!(
        strip_timestamp("2026-02-07T10:00:00.429Z provider=acme request timeout"),
        " provider=acme request timeout"
    );
    assert_eq!(strip_timestamp("no time here"), "no time here");
}

#[test]
fn full_duration_parses() {
    let parsed = parse_hms_duration("14h19m18s").expect("valid");
    assert_eq!(parsed, TimeDelta::seconds(14 * 3600 + 19 * 60 + 18));
}

#[test]
fn partial_durations_parse() {
    assert_eq!(parse_hms_duration("3h"), Ok(TimeDelta::hours(3)));
    assert_eq!(parse_hms_duration("17m16s"), Ok(TimeDelta::seconds(17 * 60 + 16)));
    assert_eq!(parse_hms_duration("30s"), Ok(TimeDelta::seconds(30)));
    assert_eq!(parse_hms_duration("1h30s"), Ok(TimeDelta::seconds(3630)));
}

#[test]
fn unit_letters_are_case_insensitive() {
    assert_eq!(parse_hms_duration("2H5M"), Ok(TimeDelta::minutes(125)));
}

#[test]
fn invalid_durations_are_rejected() {
    assert_eq!(parse_hms_duration(""), Err(DurationError::Empty));
    assert!(matches!(parse_hms_duration("soon"), Err(DurationError::Malformed(_))));
    assert!(matches!(parse_hms_duration("3m2h"), Err(DurationError::Malformed(_))));
    assert!(matches!(parse_hms_duration("45"), Err(DurationError::Malformed(_))));
    assert!(matches!(parse_hms_duration("0h0m"), Err(DurationError::Zero(_))));
}

#[test]
fn reset_hint_from_rate_limit_message() {
    let hint = reset_after_from_text("429: rate_limit, reset after 45m").expect("hint");
    assert_eq!(hint.after, TimeDelta::minutes(45));
    assert_eq!(hint.raw, "45m");
}

#[test]
fn reset_hint_from_quota_message() {
    let hint = reset_after_from_text("Your quota will reset after 3h.").expect("hint");
    assert_eq!(hint.after, TimeDelta::hours(3));
}

#[test]
fn unparseable_reset_is_no_hint() {
    assert!(reset_after_from_text("reset after a while").is_none());
    assert!(reset_after_from_text("429 Too Many Requests").is_none());
}
