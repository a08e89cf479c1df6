//! Guardian CLI entry point.
//!
//! Provides `report` and `models` subcommands for rendering the gateway
//! audit report or listing the configured model catalog.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use guardian::catalog::ModelCatalog;
use guardian::config::{
    default_config_path, default_state_dir, load_guardian_config, resolve_timezone,
    GuardianConfig, GuardianPaths, OutputFormat,
};
use guardian::report::{build_report, gather, ReportSettings};
use guardian::reporter;
use guardian::watcher::Watcher;

/// Health audit for the agent gateway.
#[derive(Parser)]
#[command(name = "guardian", version, about)]
struct Cli {
    /// Gateway state directory (default: ~/.openclaw).
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Guardian config file (default: <state-dir>/guardian/guardian.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write JSON logs with daily rotation to this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Render the audit report to stdout.
    Report {
        /// Lookback window in hours.
        #[arg(long)]
        hours: Option<f64>,

        /// Status-matrix lookback in hours (default: max(hours, 24)).
        #[arg(long)]
        llm_hours: Option<f64>,

        /// How long a seen cooldown still counts, in minutes.
        #[arg(long)]
        cooldown_sticky_minutes: Option<u32>,

        /// How long a 429 without a reset hint still counts, in minutes.
        #[arg(long)]
        rate_limit_sticky_minutes: Option<u32>,

        /// IANA timezone name (default: gateway's agents.defaults.userTimezone).
        #[arg(long)]
        tz: Option<String>,

        /// Output format.
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// List the configured models.
    Models,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _logging_guard = guardian::logging::init(cli.log_dir.as_deref())?;

    let state_dir = match &cli.state_dir {
        Some(dir) => dir.clone(),
        None => default_state_dir()?,
    };
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(&state_dir));
    let config = load_guardian_config(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let root = config.paths.state_dir.clone().unwrap_or(state_dir);
    let paths = GuardianPaths::under(&root, &config.paths.runtime_log_dir);
    let watcher = Watcher::new(paths);

    match cli.command {
        Command::Report {
            hours,
            llm_hours,
            cooldown_sticky_minutes,
            rate_limit_sticky_minutes,
            tz,
            format,
        } => {
            let overrides = ReportOverrides {
                hours,
                llm_hours,
                cooldown_sticky_minutes,
                rate_limit_sticky_minutes,
                tz,
                format,
            };
            handle_report(&watcher, &config, overrides)
        }
        Command::Models => handle_models(&watcher),
    }
}

/// Flags that override values from `guardian.toml`.
struct ReportOverrides {
    hours: Option<f64>,
    llm_hours: Option<f64>,
    cooldown_sticky_minutes: Option<u32>,
    rate_limit_sticky_minutes: Option<u32>,
    tz: Option<String>,
    format: Option<OutputFormat>,
}

/// Render the audit report to stdout.
fn handle_report(
    watcher: &Watcher,
    config: &GuardianConfig,
    overrides: ReportOverrides,
) -> anyhow::Result<()> {
    let settings = ReportSettings {
        hours: overrides.hours.unwrap_or(config.window.hours),
        llm_hours: overrides.llm_hours.or(config.window.llm_hours),
        cooldown_sticky_minutes: overrides
            .cooldown_sticky_minutes
            .unwrap_or(config.sticky.cooldown_minutes),
        rate_limit_sticky_minutes: overrides
            .rate_limit_sticky_minutes
            .unwrap_or(config.sticky.rate_limit_minutes),
        max_restart_details: config.report.max_restart_details,
    };
    anyhow::ensure!(
        settings.hours.is_finite() && settings.hours > 0.0,
        "--hours must be positive"
    );

    let gateway_config = watcher.gateway_config();
    let explicit_tz = overrides.tz.as_deref().or(config.report.timezone.as_deref());
    let tz = resolve_timezone(explicit_tz, &gateway_config);
    let catalog = ModelCatalog::from_gateway_config(&gateway_config);
    debug!(models = catalog.len(), timezone = tz.name(), "resolved catalog");

    let now = chrono::Utc::now();
    let inputs = gather(watcher, &settings, catalog, tz, now);
    let report = build_report(&inputs, &settings);

    let format = overrides.format.unwrap_or(config.report.format);
    let rendered = reporter::render(&report, format, config.report.max_events)?;
    print!("{rendered}");

    info!(
        restarts = report.gateway.restart_count,
        models = report.llm_health.matrix_rows.len(),
        "report rendered"
    );
    Ok(())
}

/// Print the configured model catalog, one `model_id` per line.
fn handle_models(watcher: &Watcher) -> anyhow::Result<()> {
    let catalog = ModelCatalog::from_gateway_config(&watcher.gateway_config());
    if catalog.is_empty() {
        info!(
            config = %watcher.paths().gateway_config.display(),
            "no models configured"
        );
        return Ok(());
    }
    for model in catalog.models() {
        println!("{}\t{}\t{}", model.model_id, model.provider, model.model);
    }
    Ok(())
}
