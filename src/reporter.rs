//! Rendering the report as JSON, Markdown or Discord-flavoured Markdown.
//!
//! Discord does not render Markdown tables, so the Discord flavour turns
//! the status matrix into a bullet list and uses bold lines for headings.

use std::collections::BTreeMap;

use anyhow::Context;

use crate::config::OutputFormat;
use crate::report::Report;

/// Title line of rendered reports.
pub const REPORT_TITLE: &str = "\u{1f4ca} Gateway Audit Report";

/// Render `report` in the requested format.
///
/// `max_events` caps the deep-dive section of the Markdown flavours.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render(report: &Report, format: OutputFormat, max_events: usize) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => render_json(report),
        OutputFormat::Md => Ok(render_markdown(report, false, max_events)),
        OutputFormat::Discord => Ok(render_markdown(report, true, max_events)),
    }
}

/// Pretty-printed JSON with a trailing newline.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_json(report: &Report) -> anyhow::Result<String> {
    let mut out = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    out.push('\n');
    Ok(out)
}

/// Markdown report; `discord` switches tables to bullets.
pub fn render_markdown(report: &Report, discord: bool, max_events: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let heading = |title: &str| {
        if discord {
            format!("**{title}**")
        } else {
            format!("### {title}")
        }
    };

    lines.push(REPORT_TITLE.to_owned());
    lines.push(format!(
        "({} | last {} hours | timezone {})",
        report.generated_at_local, report.window_hours, report.timezone
    ));
    lines.push(String::new());

    // Infrastructure.
    lines.push(heading("\u{1f6f0}\u{fe0f} Infrastructure"));
    let gateway = &report.gateway;
    lines.push(format!("- Gateway restarts: {}.", gateway.restart_count));
    if !gateway.restart_details.is_empty() {
        let breakdown = reason_breakdown(report);
        if !breakdown.is_empty() {
            lines.push(format!("- Restart reasons: {breakdown}."));
        }
        lines.push("- Most recent restarts (up to 5):".to_owned());
        for detail in gateway.restart_details.iter().take(5) {
            lines.push(format!("  - [{}] {}", detail.timestamp, detail.reason));
        }
    }
    lines.push(format!(
        "- Watchdog: {} ({} events in the last {} hours).",
        report.watchdog.status.label(),
        report.watchdog.event_count,
        report.window_hours
    ));
    lines.push(String::new());

    // Status matrix.
    if discord {
        lines.push(heading("\u{1f9e0} LLM Status Matrix"));
        for row in &report.llm_health.matrix_rows {
            lines.push(format!(
                "- {} `{}/{}` \u{2014} {}",
                row.status, row.provider, row.model, row.diagnosis
            ));
        }
    } else {
        lines.push(heading("\u{1f9e0} LLM Status Matrix (by model)"));
        lines.push("| Provider | Model | Status | Diagnosis / Recovery |".to_owned());
        lines.push("| :--- | :--- | :--- | :--- |".to_owned());
        for row in &report.llm_health.matrix_rows {
            lines.push(format!(
                "| {} | {} | {} | {} |",
                table_cell(&row.provider),
                table_cell(&row.model),
                table_cell(&row.status),
                table_cell(&row.diagnosis)
            ));
        }
    }
    lines.push(String::new());

    // Deep dive.
    lines.push(heading("\u{1f50d} Anomaly Deep Dive"));
    let events = &report.llm_health.events;
    if events.is_empty() {
        lines.push(
            "- No rate-limit, timeout or model errors captured in the recent window.".to_owned(),
        );
    } else {
        let skip = events.len().saturating_sub(max_events);
        for event in events.iter().skip(skip) {
            lines.push(format!("- {event}"));
        }
    }
    lines.push(String::new());

    // Cron.
    lines.push(heading("\u{1f552} Scheduled Jobs"));
    if report.cron.jobs.is_empty() {
        lines.push("- No scheduled jobs found.".to_owned());
    } else {
        for job in &report.cron.jobs {
            let name = job.name.as_deref().unwrap_or("(unnamed)");
            let state = if job.enabled { "enabled" } else { "disabled" };
            let next = job.next_run_local.as_deref().unwrap_or("unknown");
            lines.push(format!("- {name}: {state}, next run {next}."));
        }
    }

    let mut out = lines.join("\n").trim_end().to_owned();
    out.push('\n');
    out
}

/// `reason xN` pairs, most frequent first, ties by name.
fn reason_breakdown(report: &Report) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for detail in &report.gateway.restart_details {
        let count = counts.entry(detail.reason.label()).or_insert(0);
        *count = count.saturating_add(1);
    }

    let mut pairs: Vec<(&str, usize)> = counts.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    pairs
        .iter()
        .map(|(reason, count)| format!("{reason} x{count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Escape characters that would break a Markdown table row.
fn table_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
