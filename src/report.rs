//! Assembling the audit report.
//!
//! [`gather`] reads everything from disk through a [`Watcher`];
//! [`build_report`] turns those inputs into a [`Report`] without touching
//! the filesystem or the clock.

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::info;

use crate::aggregator::{build_status_matrix, StatusMatrix};
use crate::catalog::ModelCatalog;
use crate::cron::{summarize_jobs, CronJob};
use crate::restarts::{RestartEventMerger, RestartReason, WatchdogEvent};
use crate::stickiness::StickinessPolicy;
use crate::watcher::Watcher;

/// Smallest report window, in hours.
pub const MIN_WINDOW_HOURS: f64 = 0.1;
/// Smallest default status-matrix lookback, in hours.
pub const MIN_LLM_LOOKBACK_HOURS: f64 = 24.0;

/// Resolved knobs for one report run.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    /// Report window in hours, as requested.
    pub hours: f64,
    /// Status-matrix lookback; `None` means `max(hours, 24)`.
    pub llm_hours: Option<f64>,
    /// Cooldown sticky window, minutes.
    pub cooldown_sticky_minutes: u32,
    /// Rate-limit sticky window, minutes.
    pub rate_limit_sticky_minutes: u32,
    /// Restart records kept in the report.
    pub max_restart_details: usize,
}

impl ReportSettings {
    /// The report window, clamped to [`MIN_WINDOW_HOURS`].
    pub fn report_hours(&self) -> f64 {
        self.hours.max(MIN_WINDOW_HOURS)
    }

    /// The status-matrix lookback, never shorter than the report window.
    pub fn llm_hours(&self) -> f64 {
        let report = self.report_hours();
        self.llm_hours
            .unwrap_or_else(|| report.max(MIN_LLM_LOOKBACK_HOURS))
            .max(report)
    }

    /// Sticky-window policy.
    pub fn policy(&self) -> StickinessPolicy {
        StickinessPolicy::from_minutes(self.cooldown_sticky_minutes, self.rate_limit_sticky_minutes)
    }
}

/// Everything a report is computed from.
#[derive(Debug, Clone)]
pub struct ReportInputs {
    /// Generation instant.
    pub now: DateTime<Utc>,
    /// Zone times are rendered in.
    pub tz: Tz,
    /// Configured models.
    pub catalog: ModelCatalog,
    /// Gateway, error and runtime lines in the report window.
    pub infra_lines: Vec<String>,
    /// Error and runtime lines in the status-matrix lookback.
    pub llm_lines: Vec<String>,
    /// Error and runtime lines in the report window.
    pub recent_lines: Vec<String>,
    /// Watchdog audit records in the report window.
    pub watchdog_events: Vec<WatchdogEvent>,
    /// Whether the watchdog audit file exists.
    pub audit_present: bool,
    /// Parsed `jobs.json`, if any.
    pub cron_jobs: Option<serde_json::Value>,
}

/// The audit report.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Generation time in the report zone, `YYYY-MM-DD HH:MM`.
    pub generated_at_local: String,
    /// IANA zone name.
    pub timezone: String,
    /// Report window in hours, as requested.
    pub window_hours: f64,
    /// Gateway restarts.
    pub gateway: GatewaySection,
    /// Watchdog audit presence.
    pub watchdog: WatchdogSection,
    /// Per-model health.
    pub llm_health: LlmHealthSection,
    /// Scheduled jobs.
    pub cron: CronSection,
}

/// Gateway restart summary.
#[derive(Debug, Clone, Serialize)]
pub struct GatewaySection {
    /// Total restarts in the window.
    pub restart_count: usize,
    /// Newest restarts first, capped.
    pub restart_details: Vec<RestartDetail>,
}

/// One restart, rendered.
#[derive(Debug, Clone, Serialize)]
pub struct RestartDetail {
    /// Local `HH:MM`.
    pub timestamp: String,
    /// Why it happened.
    pub reason: RestartReason,
}

/// Whether the watchdog audit trail exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatchdogStatus {
    /// The audit file exists.
    AuditPresent,
    /// The audit file does not exist.
    AuditMissing,
}

impl WatchdogStatus {
    /// Label used in rendered output.
    pub fn label(self) -> &'static str {
        match self {
            Self::AuditPresent => "audit-present",
            Self::AuditMissing => "audit-missing",
        }
    }
}

/// Watchdog summary.
#[derive(Debug, Clone, Serialize)]
pub struct WatchdogSection {
    /// Audit presence.
    pub status: WatchdogStatus,
    /// Audit records in the report window.
    pub event_count: usize,
}

/// A matrix row as rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixRow {
    /// Provider name.
    pub provider: String,
    /// Model name.
    pub model: String,
    /// Glyph and label.
    pub status: String,
    /// Diagnosis or recovery note.
    pub diagnosis: String,
}

/// Per-model health.
#[derive(Debug, Clone, Serialize)]
pub struct LlmHealthSection {
    /// Rows sorted by provider then model.
    pub matrix_rows: Vec<MatrixRow>,
    /// Timeline of the report window.
    pub events: Vec<String>,
    /// Lookback the matrix was computed over.
    pub llm_lookback_hours: f64,
    /// Cooldown sticky window in effect.
    pub cooldown_sticky_minutes: u32,
}

/// Scheduled jobs.
#[derive(Debug, Clone, Serialize)]
pub struct CronSection {
    /// Jobs in file order.
    pub jobs: Vec<CronJob>,
}

/// Read every input for a report generated at `now`.
pub fn gather(
    watcher: &Watcher,
    settings: &ReportSettings,
    catalog: ModelCatalog,
    tz: Tz,
    now: DateTime<Utc>,
) -> ReportInputs {
    let since_report = hours_before(now, settings.report_hours());
    let since_llm = hours_before(now, settings.llm_hours());

    let gateway_report = watcher.gateway_lines(since_report);
    let error_report = watcher.error_lines(since_report);
    let runtime_logs = watcher.runtime_log_paths(&gateway_report);
    let runtime_report = watcher.lines_from(&runtime_logs, since_report);

    let mut recent_lines = error_report;
    recent_lines.extend(runtime_report);

    let mut infra_lines = gateway_report;
    infra_lines.extend(recent_lines.iter().cloned());

    let mut llm_lines = watcher.error_lines(since_llm);
    llm_lines.extend(watcher.lines_from(&runtime_logs, since_llm));

    info!(
        infra = infra_lines.len(),
        llm = llm_lines.len(),
        runtime_logs = runtime_logs.len(),
        "collected log lines"
    );

    ReportInputs {
        now,
        tz,
        catalog,
        infra_lines,
        llm_lines,
        recent_lines,
        watchdog_events: watcher.watchdog_events(since_report),
        audit_present: watcher.audit_present(),
        cron_jobs: watcher.cron_jobs(),
    }
}

/// Compute the report from its inputs.
pub fn build_report(inputs: &ReportInputs, settings: &ReportSettings) -> Report {
    let policy = settings.policy();
    let tz = inputs.tz;

    let restarts =
        RestartEventMerger::default().analyze(&inputs.infra_lines, &inputs.watchdog_events);

    let matrix = build_status_matrix(&inputs.llm_lines, &inputs.catalog, policy, inputs.now, tz);
    // The deep dive only covers the report window.
    let recent = build_status_matrix(&inputs.recent_lines, &inputs.catalog, policy, inputs.now, tz);

    Report {
        generated_at_local: inputs
            .now
            .with_timezone(&tz)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        timezone: tz.name().to_owned(),
        window_hours: settings.hours,
        gateway: GatewaySection {
            restart_count: restarts.len(),
            restart_details: restarts
                .iter()
                .take(settings.max_restart_details)
                .map(|record| RestartDetail {
                    timestamp: record.timestamp.with_timezone(&tz).format("%H:%M").to_string(),
                    reason: record.reason,
                })
                .collect(),
        },
        watchdog: WatchdogSection {
            status: if inputs.audit_present {
                WatchdogStatus::AuditPresent
            } else {
                WatchdogStatus::AuditMissing
            },
            event_count: inputs.watchdog_events.len(),
        },
        llm_health: LlmHealthSection {
            matrix_rows: matrix_rows(&matrix),
            events: recent.events,
            llm_lookback_hours: settings.llm_hours(),
            cooldown_sticky_minutes: settings.cooldown_sticky_minutes,
        },
        cron: CronSection {
            jobs: inputs
                .cron_jobs
                .as_ref()
                .map(|data| summarize_jobs(data, tz))
                .unwrap_or_default(),
        },
    }
}

fn matrix_rows(matrix: &StatusMatrix) -> Vec<MatrixRow> {
    matrix
        .rows
        .iter()
        .map(|row| MatrixRow {
            provider: row.provider.clone(),
            model: row.model.clone(),
            status: row.status(),
            diagnosis: row.diagnosis.clone(),
        })
        .collect()
}

/// `now` minus `hours`, saturating at the earliest representable instant.
fn hours_before(now: DateTime<Utc>, hours: f64) -> DateTime<Utc> {
    #[allow(clippy::cast_possible_truncation)]
    let seconds = (hours * 3600.0).round() as i64;
    TimeDelta::try_seconds(seconds)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
