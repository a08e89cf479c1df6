//! Configuration loading and path resolution.
//!
//! Two files are involved:
//! - `openclaw.json`: the gateway's own config, read for the model catalog
//!   and the user's timezone. Read leniently; never written.
//! - `guardian/guardian.toml`: this tool's policy knobs. Optional; every
//!   section uses `#[serde(default)]` so a missing or empty file is valid.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::stickiness::{DEFAULT_COOLDOWN_STICKY_MINUTES, DEFAULT_RATE_LIMIT_STICKY_MINUTES};

/// Zone used when none is configured or the configured one is unknown.
pub const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";

/// Guardian's own directory inside the gateway state directory.
const GUARDIAN_DIR: &str = "guardian";

/// Top-level guardian configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuardianConfig {
    /// Lookback windows.
    #[serde(default)]
    pub window: WindowConfig,

    /// Sticky windows for transient incidents.
    #[serde(default)]
    pub sticky: StickyConfig,

    /// Report rendering.
    #[serde(default)]
    pub report: ReportConfig,

    /// Filesystem locations.
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Lookback windows, in hours.
#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    /// Report window for restarts, watchdog and the event deep dive.
    #[serde(default = "default_hours")]
    pub hours: f64,

    /// Lookback for the status matrix; defaults to `max(hours, 24)`.
    #[serde(default)]
    pub llm_hours: Option<f64>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            hours: default_hours(),
            llm_hours: None,
        }
    }
}

/// Sticky windows, in minutes.
#[derive(Debug, Clone, Deserialize)]
pub struct StickyConfig {
    /// How long a seen cooldown keeps a model degraded.
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,

    /// How long a 429 without a reset hint keeps a model degraded.
    #[serde(default = "default_rate_limit_minutes")]
    pub rate_limit_minutes: u32,
}

impl Default for StickyConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: default_cooldown_minutes(),
            rate_limit_minutes: default_rate_limit_minutes(),
        }
    }
}

/// Output format of the rendered report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// Markdown with tables.
    Md,
    /// Markdown without tables, for chat clients that cannot render them.
    Discord,
}

/// Report rendering options.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// IANA timezone for rendered times; falls back to the gateway config.
    #[serde(default)]
    pub timezone: Option<String>,

    /// Default output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Restart records kept in the report.
    #[serde(default = "default_max_restart_details")]
    pub max_restart_details: usize,

    /// Events shown in the Markdown deep dive.
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            timezone: None,
            format: OutputFormat::default(),
            max_restart_details: default_max_restart_details(),
            max_events: default_max_events(),
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Gateway state directory; defaults to `~/.openclaw`.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Directory holding `openclaw-*.log` runtime logs.
    #[serde(default = "default_runtime_log_dir")]
    pub runtime_log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            runtime_log_dir: default_runtime_log_dir(),
        }
    }
}

impl GuardianConfig {
    /// Validate that configuration values are within sane bounds.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending value.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.window.hours.is_finite() && self.window.hours > 0.0,
            "window.hours must be positive"
        );
        if let Some(llm_hours) = self.window.llm_hours {
            anyhow::ensure!(
                llm_hours.is_finite() && llm_hours > 0.0,
                "window.llm_hours must be positive"
            );
        }
        anyhow::ensure!(
            self.sticky.cooldown_minutes >= 1,
            "sticky.cooldown_minutes must be >= 1"
        );
        anyhow::ensure!(
            self.sticky.rate_limit_minutes >= 1,
            "sticky.rate_limit_minutes must be >= 1"
        );
        anyhow::ensure!(
            self.report.max_restart_details >= 1,
            "report.max_restart_details must be >= 1"
        );
        Ok(())
    }
}

/// Load guardian configuration from a TOML file.
///
/// A missing file yields the defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, parsed, or fails
/// validation.
pub fn load_guardian_config(path: &Path) -> anyhow::Result<GuardianConfig> {
    if !path.exists() {
        return Ok(GuardianConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read guardian config at {}", path.display()))?;
    let config: GuardianConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse guardian config at {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Resolved locations of everything the report reads.
#[derive(Debug, Clone)]
pub struct GuardianPaths {
    /// Gateway config, `openclaw.json`.
    pub gateway_config: PathBuf,
    /// `logs/gateway.log`.
    pub gateway_log: PathBuf,
    /// `logs/gateway.err.log`.
    pub error_log: PathBuf,
    /// Watchdog audit trail, `guardian/watchdog-audit.jsonl`.
    pub watchdog_audit: PathBuf,
    /// Scheduled jobs, `cron/jobs.json`.
    pub cron_jobs: PathBuf,
    /// Directory scanned for runtime logs.
    pub runtime_log_dir: PathBuf,
}

impl GuardianPaths {
    /// Lay out paths under a state directory.
    pub fn under(root: &Path, runtime_log_dir: &Path) -> Self {
        let log_dir = root.join("logs");
        Self {
            gateway_config: root.join("openclaw.json"),
            gateway_log: log_dir.join("gateway.log"),
            error_log: log_dir.join("gateway.err.log"),
            watchdog_audit: root.join(GUARDIAN_DIR).join("watchdog-audit.jsonl"),
            cron_jobs: root.join("cron").join("jobs.json"),
            runtime_log_dir: runtime_log_dir.to_path_buf(),
        }
    }
}

/// Guardian's config file under a state directory,
/// `guardian/guardian.toml`.
pub fn default_config_path(state_dir: &Path) -> PathBuf {
    state_dir.join(GUARDIAN_DIR).join("guardian.toml")
}

/// Default gateway state directory, `~/.openclaw`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_state_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".openclaw"))
}

/// Pick the report timezone.
///
/// Precedence: explicit override, then `agents.defaults.userTimezone` from
/// the gateway config, then [`DEFAULT_TIMEZONE`]. Unknown names fall back to
/// the default.
pub fn resolve_timezone(explicit: Option<&str>, gateway_config: &Value) -> Tz {
    let name = explicit
        .or_else(|| gateway_config["agents"]["defaults"]["userTimezone"].as_str())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_TIMEZONE);

    name.parse::<Tz>().unwrap_or_else(|_| {
        warn!(timezone = name, fallback = DEFAULT_TIMEZONE, "unknown timezone");
        chrono_tz::Asia::Shanghai
    })
}

// Default value functions for serde.

fn default_hours() -> f64 {
    2.0
}

fn default_cooldown_minutes() -> u32 {
    DEFAULT_COOLDOWN_STICKY_MINUTES
}

fn default_rate_limit_minutes() -> u32 {
    DEFAULT_RATE_LIMIT_STICKY_MINUTES
}

fn default_max_restart_details() -> usize {
    10
}

fn default_max_events() -> usize {
    8
}

fn default_runtime_log_dir() -> PathBuf {
    PathBuf::from("/tmp/openclaw")
}
