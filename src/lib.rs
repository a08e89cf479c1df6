//! Guardian: deterministic health audit for an AI-agent gateway.
//!
//! Reads the gateway's raw logs and turns them into a per-model status
//! matrix with time-bounded ("sticky") severity, a deduplicated event
//! timeline, and a restart timeline attributed to the watchdog where it
//! can be. Classification is plain pattern matching; nothing is persisted
//! between runs.
//!
//! See `DESIGN.md` for the module map and policy decisions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod patterns;
pub mod timestamp;

pub mod aggregator;
pub mod catalog;
pub mod classifier;
pub mod restarts;
pub mod severity;
pub mod stickiness;

pub mod cron;
pub mod report;
pub mod reporter;
pub mod watcher;
