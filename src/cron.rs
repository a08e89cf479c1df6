//! Summary of the gateway's scheduled jobs.

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::Value;

/// One scheduled job as shown in the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CronJob {
    /// Job name.
    pub name: Option<String>,
    /// Whether the job is enabled; jobs without the flag are enabled.
    pub enabled: bool,
    /// Schedule exactly as configured.
    pub schedule: Value,
    /// Delivery target exactly as configured.
    pub delivery: Value,
    /// Next run in the report timezone, `YYYY-MM-DD HH:MM`.
    pub next_run_local: Option<String>,
}

/// Summarise `jobs.json`. Entries that are not objects are skipped.
pub fn summarize_jobs(data: &Value, tz: Tz) -> Vec<CronJob> {
    let Some(jobs) = data["jobs"].as_array() else {
        return Vec::new();
    };

    jobs.iter()
        .filter(|job| job.is_object())
        .map(|job| CronJob {
            name: job["name"].as_str().map(str::to_owned),
            enabled: job["enabled"].as_bool().unwrap_or(true),
            schedule: job["schedule"].clone(),
            delivery: job["delivery"].clone(),
            next_run_local: job["state"]["nextRunAtMs"]
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .map(|at| at.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()),
        })
        .collect()
}
