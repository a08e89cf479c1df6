//! Compiled text patterns for gateway log lines.
//!
//! Every pattern is compiled lazily on first use. A pattern that fails to
//! compile is `None` and simply never matches, so a bad pattern degrades
//! classification instead of aborting the run.

use std::sync::LazyLock;

use regex::{Captures, Regex};

macro_rules! log_pattern {
    ($(#[$meta:meta])* $name:ident, $regex_str:expr) => {
        $(#[$meta])*
        pub static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($regex_str).ok());
    };
}

log_pattern!(
    /// UTC timestamp, e.g. `2026-02-07T02:28:57.903Z`.
    TIMESTAMP,
    r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z"
);

log_pattern!(
    /// Full compact duration grammar, anchored.
    DURATION,
    r"^(?:(?P<h>\d+)h)?(?:(?P<m>\d+)m)?(?:(?P<s>\d+)s)?$"
);

log_pattern!(
    /// `reset after 14h19m18s`.
    RESET_AFTER,
    r"(?i)reset after (?P<after>(?:\d+h)?(?:\d+m)?(?:\d+s)?)"
);

log_pattern!(
    /// `quota will reset after 3h`.
    QUOTA_RESET,
    r"(?i)quota will reset after (?P<after>(?:\d+h)?(?:\d+m)?(?:\d+s)?)"
);

log_pattern!(
    /// Explicit `provider=P ... model=M` markers.
    PROVIDER_MODEL,
    r"\bprovider=(?P<provider>[\w-]+)\b.*\bmodel=(?P<model>[\w.\-]+)\b"
);

log_pattern!(
    /// `Unknown model: X`.
    UNKNOWN_MODEL,
    r"Unknown model:\s*(?P<model>[\w\-./]+)"
);

log_pattern!(
    /// `Model "X"` anywhere in the line.
    MODEL_QUOTED,
    r#"Model\s+"(?P<model>[\w\-./]+)""#
);

log_pattern!(
    /// `Model "X" is not allowed`.
    MODEL_NOT_ALLOWED,
    r#"Model\s+"(?P<model>[\w\-./]+)"\s+is not allowed"#
);

log_pattern!(
    /// `No API key found for provider "X"`.
    NO_API_KEY,
    r#"No API key found for provider\s+"(?P<provider>[\w-]+)""#
);

log_pattern!(
    /// `Provider X is in cooldown`.
    COOLDOWN_PROVIDER,
    r"(?i)\bProvider\s+(?P<provider>[\w-]+)\s+is\s+in\s+cooldown\b"
);

log_pattern!(
    /// Capacity exhaustion phrasing used instead of a bare 429.
    CAPACITY_EXHAUSTED,
    r"(?i)exhausted your capacity on this model"
);

log_pattern!(
    /// Context window / token limit phrasing.
    CONTEXT_LIMIT,
    r"(?i)(context length|max(?:imum)? tokens|token limit|too many tokens)"
);

log_pattern!(
    /// `All models failed (N): body`.
    ALL_MODELS_FAILED,
    r"(?i)all models failed\s*\(\d+\)\s*:\s*(?P<body>.*)$"
);

log_pattern!(
    /// Session lane marker naming the owning agent.
    LANE_AGENT,
    r"(?i)\blane=session:agent:(?P<agent>[^:]+):"
);

log_pattern!(
    /// Per-agent state directory path segment.
    AGENT_DIR,
    r"(?i)/\.openclaw/agents/(?P<agent>[^/]+)/"
);

log_pattern!(
    /// Runtime log path announced by the gateway.
    LOG_FILE,
    r"log file:\s*(?P<path>/\S+)"
);

/// Whether `pattern` compiled and matches `text`.
pub fn is_match(pattern: &LazyLock<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

/// Captures of `pattern` in `text`, if it compiled and matched.
pub fn captures<'t>(pattern: &LazyLock<Option<Regex>>, text: &'t str) -> Option<Captures<'t>> {
    pattern.as_ref()?.captures(text)
}

/// The named group `group` of the first match of `pattern` in `text`.
pub fn capture_group<'t>(
    pattern: &LazyLock<Option<Regex>>,
    text: &'t str,
    group: &str,
) -> Option<&'t str> {
    captures(pattern, text)?.name(group).map(|m| m.as_str())
}
