//! Log output for guardian runs.
//!
//! Logs always go to stderr, since stdout carries the rendered report. A
//! scheduled run can pass `--log-dir` to also keep a JSON trail of every
//! audit, rotated daily as `guardian.log.YYYY-MM-DD`.
//!
//! The filter is read from `GUARDIAN_LOG`, then `RUST_LOG`, and defaults to
//! `info`.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// File name prefix of the rotated JSON log.
pub const LOG_FILE_PREFIX: &str = "guardian.log";

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "GUARDIAN_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Keeps the JSON file writer flushing until the run ends.
///
/// Hold it in `main`; dropping it flushes what is still buffered.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    flush: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// Whether this run also writes the JSON log file.
    pub fn writes_file(&self) -> bool {
        self.flush.is_some()
    }
}

/// Install the global subscriber for one run.
///
/// With `log_dir` unset only stderr is written, and a subscriber that is
/// already installed is left alone. With `log_dir` set the directory is
/// created and a JSON layer is added next to stderr.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created, or if file
/// logging was asked for while another subscriber is installed.
pub fn init(log_dir: Option<&Path>) -> anyhow::Result<LoggingGuard> {
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let Some(dir) = log_dir else {
        let _ = tracing_subscriber::registry()
            .with(filter())
            .with(stderr)
            .try_init();
        return Ok(LoggingGuard { flush: None });
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let (writer, flush) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
    let json = fmt::layer().json().flatten_event(true).with_writer(writer);

    tracing_subscriber::registry()
        .with(filter())
        .with(stderr)
        .with(json)
        .try_init()
        .context("a log subscriber is already installed")?;

    Ok(LoggingGuard {
        flush: Some(flush),
    })
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}
