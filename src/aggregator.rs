//! Per-model status matrix built from classified log lines.
//!
//! Lines must be fed in the order they were read. Severity only ever gets
//! worse during a pass; the diagnosis tracks the most recent active
//! incident that is at least as severe as the row. Incidents whose sticky
//! window has elapsed never raise the severity, but leave a breadcrumb on
//! rows that still look healthy.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::debug;

use crate::catalog::{split_model_id, ModelCatalog};
use crate::classifier::{Classification, Incident, IncidentKind, KnownModels, LineClassifier};
use crate::severity::Severity;
use crate::stickiness::StickinessPolicy;

/// Status label of a row nothing has happened to.
pub const HEALTHY_LABEL: &str = "Healthy";
/// Diagnosis of a row nothing has happened to.
pub const GENERIC_DIAGNOSIS: &str = "Stable, ready.";
/// Maximum number of timeline events kept after deduplication.
pub const MAX_EVENTS: usize = 30;

const UNKNOWN_TIME: &str = "??:??";

/// One model's row in the status matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRow {
    /// Identity key, `provider/model`.
    pub model_id: String,
    /// Provider name.
    pub provider: String,
    /// Model name.
    pub model: String,
    /// Current tier.
    pub severity: Severity,
    /// Label shown next to the glyph.
    pub label: String,
    /// Diagnosis or recovery note.
    pub diagnosis: String,
}

impl StatusRow {
    /// A healthy row with the generic diagnosis.
    pub fn healthy(model_id: &str) -> Self {
        let (provider, model) = split_model_id(model_id);
        Self {
            model_id: model_id.to_owned(),
            provider: provider.to_owned(),
            model: model.to_owned(),
            severity: Severity::Green,
            label: HEALTHY_LABEL.to_owned(),
            diagnosis: GENERIC_DIAGNOSIS.to_owned(),
        }
    }

    /// Glyph plus label, e.g. `🟡 429 rate limited`.
    pub fn status(&self) -> String {
        format!("{} {}", self.severity.glyph(), self.label)
    }

    /// Whether the diagnosis is still the default one.
    pub fn has_generic_diagnosis(&self) -> bool {
        self.diagnosis == GENERIC_DIAGNOSIS
    }
}

/// Most recent timestamped incident seen for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LastSeen {
    /// When it was seen.
    pub at: DateTime<Utc>,
    /// What it was.
    pub kind: IncidentKind,
}

/// Finished output of one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusMatrix {
    /// Rows sorted by provider then model.
    pub rows: Vec<StatusRow>,
    /// Deduplicated timeline, oldest first, at most [`MAX_EVENTS`] long.
    pub events: Vec<String>,
}

impl StatusMatrix {
    /// The row for `model_id`, if present.
    pub fn row(&self, model_id: &str) -> Option<&StatusRow> {
        self.rows.iter().find(|row| row.model_id == model_id)
    }
}

/// Builds a [`StatusMatrix`] from lines fed in chronological order.
pub struct StatusMatrixAggregator<'c> {
    classifier: LineClassifier<'c>,
    policy: StickinessPolicy,
    now: DateTime<Utc>,
    tz: Tz,
    rows: HashMap<String, StatusRow>,
    last_seen: HashMap<String, LastSeen>,
    events: Vec<String>,
}

impl KnownModels for StatusMatrixAggregator<'_> {
    fn is_known(&self, model_id: &str) -> bool {
        self.rows.contains_key(model_id)
    }
}

impl<'c> StatusMatrixAggregator<'c> {
    /// Start a pass with one healthy row per configured model.
    ///
    /// `now` is the instant sticky windows are evaluated against and `tz`
    /// the zone event times are rendered in.
    pub fn new(catalog: &'c ModelCatalog, policy: StickinessPolicy, now: DateTime<Utc>, tz: Tz) -> Self {
        let rows = catalog
            .models()
            .iter()
            .map(|m| (m.model_id.clone(), StatusRow::healthy(&m.model_id)))
            .collect();
        Self {
            classifier: LineClassifier::new(catalog),
            policy,
            now,
            tz,
            rows,
            last_seen: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// Classify and apply every line, in order.
    pub fn ingest_lines<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.ingest_line(line.as_ref());
        }
    }

    /// Classify and apply one line.
    pub fn ingest_line(&mut self, line: &str) {
        let classifier = self.classifier;
        let classification = classifier.classify(line, &*self);
        self.apply_classification(classification);
    }

    /// Apply everything one line contributed.
    ///
    /// Line-level events are recorded before the line's incidents.
    pub fn apply_classification(&mut self, classification: Classification) {
        for model_id in &classification.observed_models {
            self.ensure_row(model_id);
        }

        let stamp = self.local_time(classification.observed_at);
        for event in classification.events {
            self.events.push(format!("[{stamp}] {event}"));
        }

        for incident in classification.incidents {
            self.apply_incident(incident);
        }
    }

    /// Fold one incident into its row.
    ///
    /// Active incidents raise severity and take the diagnosis. Inactive
    /// ones only leave a breadcrumb on a row that is still healthy.
    pub fn apply_incident(&mut self, incident: Incident) {
        if self.policy.is_active(&incident, self.now) {
            self.apply_severity(
                &incident.model_id,
                incident.severity,
                incident.kind.status_label(),
                &incident.diagnosis,
            );
        } else {
            let is_latest = self.is_latest(&incident);
            let breadcrumb = format!(
                "most recent anomaly at [{}]: {} (outside window / possibly recovered, needs verification)",
                self.local_time(incident.observed_at),
                incident.kind.label(),
            );
            let row = self.ensure_row(&incident.model_id);
            if row.severity.is_healthy() && is_latest {
                row.diagnosis = breadcrumb;
            }
            debug!(model = %incident.model_id, kind = ?incident.kind, "incident outside sticky window");
        }

        if let Some(event) = &incident.event {
            let stamp = self.local_time(incident.observed_at);
            self.events.push(format!("[{stamp}] {event}"));
        }

        if let Some(at) = incident.observed_at {
            self.record_observation(&incident.model_id, at, incident.kind);
        }
    }

    /// Raise a row's severity and update its diagnosis.
    ///
    /// Severity becomes the worse of current and incoming; on a tie the
    /// current label stays. The diagnosis is replaced while it is still
    /// generic, or when the incoming tier is at least the current one. A
    /// milder incident never rewrites a worse row's diagnosis.
    pub fn apply_severity(&mut self, model_id: &str, severity: Severity, label: &str, diagnosis: &str) {
        let row = self.ensure_row(model_id);
        let replaces_diagnosis = row.has_generic_diagnosis() || severity >= row.severity;
        if severity > row.severity {
            row.severity = severity;
            row.label = label.to_owned();
        }
        if !diagnosis.is_empty() && replaces_diagnosis {
            row.diagnosis = diagnosis.to_owned();
        }
    }

    /// Remember the most recent timestamped incident for a model.
    pub fn record_observation(&mut self, model_id: &str, at: DateTime<Utc>, kind: IncidentKind) {
        let newer = self
            .last_seen
            .get(model_id)
            .is_none_or(|previous| at > previous.at);
        if newer {
            self.last_seen.insert(model_id.to_owned(), LastSeen { at, kind });
        }
    }

    /// The most recent timestamped incident recorded for `model_id`.
    pub fn last_seen(&self, model_id: &str) -> Option<LastSeen> {
        self.last_seen.get(model_id).copied()
    }

    /// Finish the pass: sort rows and deduplicate the timeline.
    pub fn finish(self) -> StatusMatrix {
        let mut rows: Vec<StatusRow> = self.rows.into_values().collect();
        rows.sort_by(|a, b| (&a.provider, &a.model).cmp(&(&b.provider, &b.model)));
        StatusMatrix {
            rows,
            events: dedup_events(self.events, MAX_EVENTS),
        }
    }

    fn ensure_row(&mut self, model_id: &str) -> &mut StatusRow {
        self.rows
            .entry(model_id.to_owned())
            .or_insert_with(|| StatusRow::healthy(model_id))
    }

    /// An incident is not older than anything already seen for its model.
    fn is_latest(&self, incident: &Incident) -> bool {
        match (self.last_seen.get(&incident.model_id), incident.observed_at) {
            (None, _) => true,
            (Some(previous), Some(at)) => at >= previous.at,
            (Some(_), None) => false,
        }
    }

    fn local_time(&self, at: Option<DateTime<Utc>>) -> String {
        at.map_or_else(
            || UNKNOWN_TIME.to_owned(),
            |at| at.with_timezone(&self.tz).format("%H:%M").to_string(),
        )
    }
}

/// Drop repeated events (first occurrence wins) and keep the last `cap`.
pub fn dedup_events(events: Vec<String>, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique: Vec<String> = events
        .into_iter()
        .filter(|event| seen.insert(event.clone()))
        .collect();
    let excess = unique.len().saturating_sub(cap);
    unique.drain(..excess);
    unique
}

/// Run a whole pass over `lines` and return the finished matrix.
pub fn build_status_matrix<I, S>(
    lines: I,
    catalog: &ModelCatalog,
    policy: StickinessPolicy,
    now: DateTime<Utc>,
    tz: Tz,
) -> StatusMatrix
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut aggregator = StatusMatrixAggregator::new(catalog, policy, now, tz);
    aggregator.ingest_lines(lines);
    aggregator.finish()
}
