//! Tests for the status matrix aggregator.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use guardian::aggregator::{
    build_status_matrix, dedup_events, StatusMatrix, StatusMatrixAggregator, GENERIC_DIAGNOSIS,
    HEALTHY_LABEL, MAX_EVENTS,
};
use guardian::catalog::ModelCatalog;
use guardian::classifier::{Incident, IncidentKind};
use guardian::severity::Severity;
use guardian::stickiness::StickinessPolicy;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 7, 10, 0, 0)
        .single()
        .expect("valid time")
}

fn stamped(at: DateTime<Utc>, msg: &str) -> String {
    format!("{} {msg}", at.format("%Y-%m-%dT%H:%M:%S%.3fZ"))
}

fn run(catalog: &ModelCatalog, lines: &[String], now: DateTime<Utc>) -> StatusMatrix {
    build_status_matrix(
        lines,
        catalog,
        StickinessPolicy::default(),
        now,
        chrono_tz::UTC,
    )
}

fn incident(kind: IncidentKind, at: DateTime<Utc>, diagnosis: &str) -> Incident {
    Incident {
        model_id: "acme/gpt-x".to_owned(),
        kind,
        observed_at: Some(at),
        severity: kind.severity(),
        diagnosis: diagnosis.to_owned(),
        recovery_hint: None,
        event: Some(format!("acme/gpt-x: {}", kind.label())),
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn short_rate_limit_turns_row_yellow() {
    let catalog = ModelCatalog::from_ids(["acme/gpt-x"]);
    let lines = vec![stamped(
        t0(),
        "provider=acme model=gpt-x error 429 rate_limit reset after 45m",
    )];
    let matrix = run(&catalog, &lines, t0() + TimeDelta::minutes(5));

    let row = matrix.row("acme/gpt-x").expect("row");
    assert_eq!(row.severity, Severity::Yellow);
    assert_eq!(row.status(), "\u{1f7e1} 429 rate limited");
    assert!(row.diagnosis.contains("\u{2248}45m"));
    assert_eq!(
        matrix.events,
        vec!["[10:00] acme/gpt-x: 429/rate_limit (resets in \u{2248}45m)".to_owned()]
    );
}

#[test]
fn long_rate_limit_turns_row_red() {
    let catalog = ModelCatalog::from_ids(["acme/gpt-x"]);
    let lines = vec![stamped(
        t0(),
        "provider=acme model=gpt-x error 429 rate_limit reset after 3h",
    )];
    let matrix = run(&catalog, &lines, t0() + TimeDelta::minutes(5));

    let row = matrix.row("acme/gpt-x").expect("row");
    assert_eq!(row.severity, Severity::Red);
    assert_eq!(row.label, "429 quota/capacity limit");
}

#[test]
fn missing_api_key_reddens_whole_provider() {
    let catalog = ModelCatalog::from_ids(["acme/gpt-x", "acme/gpt-y", "other/m1"]);
    let lines = vec![stamped(t0(), r#"No API key found for provider "acme""#)];
    let matrix = run(&catalog, &lines, t0() + TimeDelta::hours(12));

    for id in ["acme/gpt-x", "acme/gpt-y"] {
        let row = matrix.row(id).expect("row");
        assert_eq!(row.severity, Severity::Red);
        assert!(row.diagnosis.contains("missing credential"));
    }
    let other = matrix.row("other/m1").expect("row");
    assert_eq!(other.severity, Severity::Green);
    assert_eq!(other.diagnosis, GENERIC_DIAGNOSIS);
    assert_eq!(matrix.events, vec!["[10:00] provider=acme: No API key".to_owned()]);
}

#[test]
fn expired_incident_leaves_breadcrumb_only() {
    let catalog = ModelCatalog::from_ids(["acme/gpt-x"]);
    let lines = vec![stamped(t0(), "provider=acme model=gpt-x cooldown active")];
    let matrix = run(&catalog, &lines, t0() + TimeDelta::hours(10));

    let row = matrix.row("acme/gpt-x").expect("row");
    assert_eq!(row.severity, Severity::Green);
    assert_eq!(row.label, HEALTHY_LABEL);
    assert_eq!(
        row.diagnosis,
        "most recent anomaly at [10:00]: cooldown (outside window / possibly recovered, needs verification)"
    );
}

// ---------------------------------------------------------------------------
// Diagnosis rules
// ---------------------------------------------------------------------------

#[test]
fn severity_never_improves_within_a_pass() {
    let catalog = ModelCatalog::from_ids(["acme/gpt-x"]);
    let lines = vec![
        stamped(t0(), "provider=acme model=gpt-x 429 reset after 3h"),
        stamped(
            t0() + TimeDelta::minutes(1),
            "provider=acme model=gpt-x request timeout",
        ),
    ];
    let matrix = run(&catalog, &lines, t0() + TimeDelta::minutes(5));

    let row = matrix.row("acme/gpt-x").expect("row");
    assert_eq!(row.severity, Severity::Red);
    assert_eq!(row.label, "429 quota/capacity limit");
    // A milder incident does not rewrite a worse row's diagnosis.
    assert!(row.diagnosis.contains("quota/capacity"));
    assert!(row.diagnosis.contains("\u{2248}3h"));
}

#[test]
fn milder_incident_keeps_missing_credential_diagnosis() {
    let catalog = ModelCatalog::from_ids(["acme/gpt-x"]);
    let lines = vec![
        stamped(t0(), r#"No API key found for provider "acme""#),
        stamped(
            t0() + TimeDelta::minutes(1),
            "provider=acme model=gpt-x request timeout",
        ),
    ];
    let matrix = run(&catalog, &lines, t0() + TimeDelta::minutes(5));

    let row = matrix.row("acme/gpt-x").expect("row");
    assert_eq!(row.severity, Severity::Red);
    assert_eq!(row.label, "Missing credential");
    assert!(row.diagnosis.contains("missing credential"));
    // The timeout still shows up on the timeline.
    assert!(matrix
        .events
        .contains(&"[10:01] acme/gpt-x: timeout".to_owned()));
}

#[test]
fn worse_incident_takes_over_diagnosis() {
    let catalog = ModelCatalog::from_ids(["acme/gpt-x"]);
    let mut aggregator = StatusMatrixAggregator::new(
        &catalog,
        StickinessPolicy::default(),
        t0(),
        chrono_tz::UTC,
    );
    aggregator.apply_severity("acme/gpt-x", Severity::Yellow, "slow", "yellow diagnosis");
    aggregator.apply_severity("acme/gpt-x", Severity::Red, "down", "red diagnosis");
    aggregator.apply_severity("acme/gpt-x", Severity::Yellow, "slow", "later yellow");

    let matrix = aggregator.finish();
    let row = matrix.row("acme/gpt-x").expect("row");
    assert_eq!(row.label, "down");
    assert_eq!(row.diagnosis, "red diagnosis");
}

#[test]
fn same_timestamp_last_applied_wins_diagnosis() {
    let catalog = ModelCatalog::from_ids(["acme/gpt-x"]);
    let lines = vec![
        stamped(t0(), "Provider acme is in cooldown"),
        stamped(t0(), "provider=acme model=gpt-x request timeout"),
    ];
    let matrix = run(&catalog, &lines, t0() + TimeDelta::minutes(5));

    let row = matrix.row("acme/gpt-x").expect("row");
    assert_eq!(row.severity, Severity::Yellow);
    assert_eq!(row.label, "Transient throttling");
    assert_eq!(row.diagnosis, "timeout / ETIMEDOUT (seen in window).");
}

#[test]
fn expired_incident_does_not_touch_degraded_row() {
    let catalog = ModelCatalog::from_ids(["acme/gpt-x"]);
    let now = t0() + TimeDelta::hours(10);
    let mut aggregator =
        StatusMatrixAggregator::new(&catalog, StickinessPolicy::default(), now, chrono_tz::UTC);

    aggregator.apply_incident(incident(IncidentKind::UnknownModel, t0(), "bad model"));
    aggregator.apply_incident(incident(
        IncidentKind::Timeout,
        t0() + TimeDelta::hours(1),
        "timeout",
    ));

    let matrix = aggregator.finish();
    let row = matrix.row("acme/gpt-x").expect("row");
    assert_eq!(row.severity, Severity::Red);
    assert_eq!(row.diagnosis, "bad model");
}

#[test]
fn older_expired_incident_does_not_replace_newer_breadcrumb() {
    let catalog = ModelCatalog::from_ids(["acme/gpt-x"]);
    let now = t0() + TimeDelta::hours(12);
    let mut aggregator =
        StatusMatrixAggregator::new(&catalog, StickinessPolicy::default(), now, chrono_tz::UTC);

    aggregator.apply_incident(incident(IncidentKind::Timeout, t0() + TimeDelta::hours(1), ""));
    aggregator.apply_incident(incident(IncidentKind::Cooldown, t0(), ""));

    let last = aggregator.last_seen("acme/gpt-x").expect("observed");
    assert_eq!(last.kind, IncidentKind::Timeout);

    let matrix = aggregator.finish();
    let row = matrix.row("acme/gpt-x").expect("row");
    assert!(row.diagnosis.contains("[11:00]: timeout"));
}

#[test]
fn applying_same_incident_twice_is_idempotent() {
    let catalog = ModelCatalog::from_ids(["acme/gpt-x", "other/m1"]);
    let now = t0() + TimeDelta::minutes(5);
    let repeated = incident(IncidentKind::Timeout, t0(), "timeout / ETIMEDOUT (seen in window).");

    let mut once =
        StatusMatrixAggregator::new(&catalog, StickinessPolicy::default(), now, chrono_tz::UTC);
    once.apply_incident(repeated.clone());

    let mut twice =
        StatusMatrixAggregator::new(&catalog, StickinessPolicy::default(), now, chrono_tz::UTC);
    twice.apply_incident(repeated.clone());
    twice.apply_incident(repeated);

    assert_eq!(once.finish(), twice.finish());
}

#[test]
fn apply_severity_keeps_label_on_tie() {
    let catalog = ModelCatalog::from_ids(["acme/gpt-x"]);
    let mut aggregator = StatusMatrixAggregator::new(
        &catalog,
        StickinessPolicy::default(),
        t0(),
        chrono_tz::UTC,
    );
    aggregator.apply_severity("acme/gpt-x", Severity::Yellow, "first", "one");
    aggregator.apply_severity("acme/gpt-x", Severity::Yellow, "second", "two");

    let matrix = aggregator.finish();
    let row = matrix.row("acme/gpt-x").expect("row");
    assert_eq!(row.label, "first");
    assert_eq!(row.diagnosis, "two");
}

// ---------------------------------------------------------------------------
// Rows and events
// ---------------------------------------------------------------------------

#[test]
fn unknown_model_creates_row() {
    let catalog = ModelCatalog::from_ids(["acme/gpt-x"]);
    let lines = vec![stamped(t0(), "Unknown model: acme/gpt-z")];
    let matrix = run(&catalog, &lines, t0() + TimeDelta::days(1));

    let row = matrix.row("acme/gpt-z").expect("row created");
    assert_eq!(row.severity, Severity::Red);
    assert_eq!(row.label, "Invalid model");
    assert_eq!(matrix.rows.len(), 2);
}

#[test]
fn observed_bare_id_is_trusted_in_aggregate_lines() {
    let catalog = ModelCatalog::default();
    let failure = stamped(
        t0() + TimeDelta::minutes(1),
        "All models failed (1): local: 429 rate_limit",
    );

    let without = run(&catalog, &[failure.clone()], t0() + TimeDelta::minutes(5));
    assert!(without.rows.is_empty());

    let lines = vec![stamped(t0(), "Unknown model: local"), failure];
    let with = run(&catalog, &lines, t0() + TimeDelta::minutes(5));
    assert!(with
        .events
        .contains(&"[10:01] local: 429/rate_limit".to_owned()));
    let row = with.row("local").expect("row");
    assert_eq!(row.provider, "unknown");
    assert_eq!(row.severity, Severity::Red);
}

#[test]
fn rows_sorted_by_provider_then_model() {
    let catalog = ModelCatalog::from_ids(["zeta/a", "acme/b", "acme/a"]);
    let matrix = run(&catalog, &[], t0());
    let ids: Vec<&str> = matrix.rows.iter().map(|r| r.model_id.as_str()).collect();
    assert_eq!(ids, vec!["acme/a", "acme/b", "zeta/a"]);
    assert!(matrix.rows.iter().all(|r| r.status() == "\u{1f7e2} Healthy"));
}

#[test]
fn repeated_lines_produce_one_event() {
    let catalog = ModelCatalog::from_ids(["acme/gpt-x"]);
    let line = stamped(t0(), "provider=acme model=gpt-x request timeout");
    let matrix = run(&catalog, &[line.clone(), line], t0() + TimeDelta::minutes(5));
    assert_eq!(matrix.events, vec!["[10:00] acme/gpt-x: timeout".to_owned()]);
}

#[test]
fn untimed_line_is_inactive_with_placeholder_time() {
    let catalog = ModelCatalog::from_ids(["acme/gpt-x"]);
    let lines = vec!["provider=acme model=gpt-x request timeout".to_owned()];
    let matrix = run(&catalog, &lines, t0());

    let row = matrix.row("acme/gpt-x").expect("row");
    assert_eq!(row.severity, Severity::Green);
    assert!(row.diagnosis.contains("[??:??]: timeout"));
    assert_eq!(matrix.events, vec!["[??:??] acme/gpt-x: timeout".to_owned()]);
}

#[test]
fn event_times_use_report_timezone() {
    let catalog = ModelCatalog::from_ids(["acme/gpt-x"]);
    let lines = vec![stamped(t0(), "provider=acme model=gpt-x request timeout")];
    let matrix = build_status_matrix(
        &lines,
        &catalog,
        StickinessPolicy::default(),
        t0(),
        chrono_tz::Asia::Shanghai,
    );
    assert_eq!(matrix.events, vec!["[18:00] acme/gpt-x: timeout".to_owned()]);
}

#[test]
fn dedup_keeps_first_occurrence_order() {
    let events = ["b", "a", "b", "c", "a"].map(str::to_owned).to_vec();
    assert_eq!(dedup_events(events, MAX_EVENTS), vec!["b", "a", "c"]);
}

#[test]
fn dedup_caps_to_most_recent() {
    let events: Vec<String> = (0..40).map(|i| format!("e{i}")).collect();
    let kept = dedup_events(events, MAX_EVENTS);
    assert_eq!(kept.len(), MAX_EVENTS);
    assert_eq!(kept.first().map(String::as_str), Some("e10"));
    assert_eq!(kept.last().map(String::as_str), Some("e39"));
}
