//! Rule-based classification of gateway log lines into incidents.
//!
//! A line is run through an ordered battery of rules; the first rule that
//! claims the line decides its classification. Most lines are claimed by no
//! rule and yield nothing. Rate limits, cooldowns, timeouts and context
//! limits share a second, message-level battery that is applied both to
//! whole lines and to the per-model segments of an `All models failed` line.

use std::borrow::Cow;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::trace;

use crate::catalog::ModelCatalog;
use crate::patterns;
use crate::severity::Severity;
use crate::timestamp::{extract_timestamp, reset_after_from_text, strip_timestamp, ResetHint};

/// The agent whose health the report describes.
pub const PRIMARY_AGENT: &str = "main";

/// Reset hints up to this many seconds are treated as per-minute throttling.
const SHORT_RESET_LIMIT_SECS: i64 = 3600;

/// What kind of anomaly an incident records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    /// Model-level cooldown.
    Cooldown,
    /// Cooldown announced for a whole provider.
    ProviderCooldown,
    /// 429 with a reset hint of at most one hour.
    RateLimitShort,
    /// 429 or capacity exhaustion with a reset hint over one hour.
    RateLimitLong,
    /// 429 without any parseable reset hint.
    RateLimitUnbounded,
    /// Connection or request timeout.
    Timeout,
    /// Context window or token limit hit.
    ContextLimit,
    /// The provider has no API key configured.
    NoApiKey,
    /// The model is unknown or not allowed.
    UnknownModel,
}

impl IncidentKind {
    /// Short label used in breadcrumbs and events.
    pub fn label(self) -> &'static str {
        match self {
            Self::Cooldown => "cooldown",
            Self::ProviderCooldown => "provider cooldown",
            Self::RateLimitShort | Self::RateLimitLong | Self::RateLimitUnbounded => {
                "429/rate_limit"
            }
            Self::Timeout => "timeout",
            Self::ContextLimit => "token/context limit",
            Self::NoApiKey => "no API key",
            Self::UnknownModel => "unknown model",
        }
    }

    /// Severity while the incident is active.
    pub fn severity(self) -> Severity {
        match self {
            Self::RateLimitLong | Self::NoApiKey | Self::UnknownModel => Severity::Red,
            _ => Severity::Yellow,
        }
    }

    /// Status label shown next to the severity glyph.
    pub fn status_label(self) -> &'static str {
        match self {
            Self::Cooldown | Self::ProviderCooldown => "Transient throttling",
            Self::RateLimitShort | Self::RateLimitUnbounded => "429 rate limited",
            Self::RateLimitLong => "429 quota/capacity limit",
            Self::Timeout => "Connection timeout",
            Self::ContextLimit => "Token/context limit",
            Self::NoApiKey => "Missing credential",
            Self::UnknownModel => "Invalid model",
        }
    }
}

/// One anomaly attributed to one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incident {
    /// Affected model id.
    pub model_id: String,
    /// Anomaly kind.
    pub kind: IncidentKind,
    /// Timestamp of the line, if it had one.
    pub observed_at: Option<DateTime<Utc>>,
    /// Severity while active.
    pub severity: Severity,
    /// Human-readable diagnosis for the status matrix.
    pub diagnosis: String,
    /// Parsed `reset after` hint, for rate limits.
    pub recovery_hint: Option<ResetHint>,
    /// Timeline entry, without the time prefix.
    pub event: Option<String>,
}

impl Incident {
    /// The parsed reset duration, if any.
    pub fn reset_after(&self) -> Option<TimeDelta> {
        self.recovery_hint.as_ref().map(|hint| hint.after)
    }
}

/// Everything one line contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Timestamp of the line.
    pub observed_at: Option<DateTime<Utc>>,
    /// Model ids the line mentions, whether or not anything went wrong.
    pub observed_models: Vec<String>,
    /// Line-level timeline entries (provider-wide or unattributed).
    pub events: Vec<String>,
    /// Model-level incidents in application order.
    pub incidents: Vec<Incident>,
}

impl Classification {
    fn empty(observed_at: Option<DateTime<Utc>>) -> Self {
        Self {
            observed_at,
            ..Self::default()
        }
    }

    /// Whether the line contributed nothing.
    pub fn is_empty(&self) -> bool {
        self.observed_models.is_empty() && self.events.is_empty() && self.incidents.is_empty()
    }
}

/// Lookup of model ids that already have a row in the status matrix.
pub trait KnownModels {
    /// Whether `model_id` is configured or has been observed.
    fn is_known(&self, model_id: &str) -> bool;
}

impl KnownModels for ModelCatalog {
    fn is_known(&self, model_id: &str) -> bool {
        self.contains(model_id)
    }
}

/// Message-level finding, before it is attributed to a model.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Draft {
    kind: IncidentKind,
    diagnosis: String,
    recovery_hint: Option<ResetHint>,
}

impl Draft {
    fn plain(kind: IncidentKind, diagnosis: &str) -> Self {
        Self {
            kind,
            diagnosis: diagnosis.to_owned(),
            recovery_hint: None,
        }
    }

    fn into_incident(self, model_id: &str, observed_at: Option<DateTime<Utc>>) -> Incident {
        let event = match &self.recovery_hint {
            Some(hint) => format!("{model_id}: {} ({})", self.kind.label(), recovery_text(hint)),
            None => format!("{model_id}: {}", self.kind.label()),
        };
        Incident {
            model_id: model_id.to_owned(),
            kind: self.kind,
            observed_at,
            severity: self.kind.severity(),
            diagnosis: self.diagnosis,
            recovery_hint: self.recovery_hint,
            event: Some(event),
        }
    }
}

fn recovery_text(hint: &ResetHint) -> String {
    format!("resets in \u{2248}{}", hint.raw)
}

fn fan_out(
    kind: IncidentKind,
    diagnosis: &str,
    model_ids: impl IntoIterator<Item = String>,
    observed_at: Option<DateTime<Utc>>,
) -> Vec<Incident> {
    model_ids
        .into_iter()
        .map(|model_id| Incident {
            model_id,
            kind,
            observed_at,
            severity: kind.severity(),
            diagnosis: diagnosis.to_owned(),
            recovery_hint: None,
            event: None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Message rules
// ---------------------------------------------------------------------------

struct Message<'m> {
    text: &'m str,
    lowered: String,
}

impl<'m> Message<'m> {
    fn new(text: &'m str) -> Self {
        Self {
            text,
            lowered: text.to_lowercase(),
        }
    }

    fn is_rate_limit(&self) -> bool {
        self.lowered.contains("429")
            || self.lowered.contains("rate_limit")
            || patterns::is_match(&patterns::CAPACITY_EXHAUSTED, self.text)
    }

    fn is_context_limit(&self) -> bool {
        patterns::is_match(&patterns::CONTEXT_LIMIT, self.text)
    }
}

type MessageRule = fn(&Message<'_>) -> Option<Draft>;

/// Message-level rules in priority order.
const MESSAGE_RULES: &[(&str, MessageRule)] = &[
    ("cooldown", cooldown_rule),
    ("rate_limit", rate_limit_rule),
    ("timeout", timeout_rule),
    ("context_limit", context_limit_rule),
];

fn classify_message(text: &str) -> Option<Draft> {
    let message = Message::new(text);
    MESSAGE_RULES.iter().find_map(|(name, rule)| {
        let draft = rule(&message)?;
        trace!(rule = name, kind = ?draft.kind, "message rule matched");
        Some(draft)
    })
}

fn cooldown_rule(msg: &Message<'_>) -> Option<Draft> {
    let hit = msg.lowered.contains("cooldown")
        || patterns::is_match(&patterns::COOLDOWN_PROVIDER, msg.text);
    hit.then(|| {
        Draft::plain(
            IncidentKind::Cooldown,
            "Provider cooldown / transient throttling (seen in window).",
        )
    })
}

fn rate_limit_rule(msg: &Message<'_>) -> Option<Draft> {
    if !msg.is_rate_limit() {
        return None;
    }

    let draft = match reset_after_from_text(msg.text) {
        Some(hint) if hint.after.num_seconds() <= SHORT_RESET_LIMIT_SECS => Draft {
            kind: IncidentKind::RateLimitShort,
            diagnosis: format!(
                "429 rate limit (short-term, likely RPM); {}.",
                recovery_text(&hint)
            ),
            recovery_hint: Some(hint),
        },
        Some(hint) => Draft {
            kind: IncidentKind::RateLimitLong,
            diagnosis: format!(
                "429 quota/capacity limit (wait for reset); {}.",
                recovery_text(&hint)
            ),
            recovery_hint: Some(hint),
        },
        None => Draft::plain(
            IncidentKind::RateLimitUnbounded,
            "429 rate limit (likely RPM or concurrency).",
        ),
    };
    Some(draft)
}

fn timeout_rule(msg: &Message<'_>) -> Option<Draft> {
    let hit = msg.lowered.contains("timeout") || msg.lowered.contains("etimedout");
    hit.then(|| Draft::plain(IncidentKind::Timeout, "timeout / ETIMEDOUT (seen in window)."))
}

fn context_limit_rule(msg: &Message<'_>) -> Option<Draft> {
    msg.is_context_limit().then(|| {
        Draft::plain(
            IncidentKind::ContextLimit,
            "Token/context limit hit (seen in window).",
        )
    })
}

// ---------------------------------------------------------------------------
// Line rules
// ---------------------------------------------------------------------------

struct Line<'l> {
    text: &'l str,
    /// `text` without its timestamp, for the message rules.
    message: Cow<'l, str>,
    observed_at: Option<DateTime<Utc>>,
    catalog: &'l ModelCatalog,
    known: &'l dyn KnownModels,
    /// Model ids the line can be attributed to.
    attributed: Vec<String>,
}

impl<'l> Line<'l> {
    fn new(text: &'l str, catalog: &'l ModelCatalog, known: &'l dyn KnownModels) -> Self {
        Self {
            text,
            message: strip_timestamp(text),
            observed_at: extract_timestamp(text),
            catalog,
            known,
            attributed: attribute_models(text, catalog),
        }
    }
}

/// Resolve the model ids a line is about.
///
/// Explicit `provider=`/`model=` markers win (mapped to the configured id
/// when one exists), then a quoted `Model "X"`, then every configured id
/// that occurs verbatim in the line.
fn attribute_models(text: &str, catalog: &ModelCatalog) -> Vec<String> {
    if let Some(caps) = patterns::captures(&patterns::PROVIDER_MODEL, text) {
        if let (Some(provider), Some(model)) = (caps.name("provider"), caps.name("model")) {
            let (provider, model) = (provider.as_str(), model.as_str());
            let id = catalog
                .resolve(provider, model)
                .map_or_else(|| format!("{provider}/{model}"), |m| m.model_id.clone());
            return vec![id];
        }
    }

    if let Some(quoted) = patterns::capture_group(&patterns::MODEL_QUOTED, text, "model") {
        return vec![quoted.to_owned()];
    }

    catalog
        .mentioned_in(text)
        .map(|m| m.model_id.clone())
        .collect()
}

type LineRule = fn(&Line<'_>) -> Option<Classification>;

/// Line-level rules in priority order. The first rule returning `Some`
/// claims the line.
const LINE_RULES: &[(&str, LineRule)] = &[
    ("foreign_agent", foreign_agent_rule),
    ("aggregate_failure", aggregate_failure_rule),
    ("no_api_key", no_api_key_rule),
    ("provider_cooldown", provider_cooldown_rule),
    ("unknown_model", unknown_model_rule),
    ("attributed", attributed_rule),
    ("unattributed", unattributed_rule),
];

/// Drop lines about any agent other than the primary one.
fn foreign_agent_rule(line: &Line<'_>) -> Option<Classification> {
    let agent = patterns::capture_group(&patterns::LANE_AGENT, line.text, "agent")
        .filter(|agent| !is_primary_agent(agent))
        .or_else(|| {
            patterns::capture_group(&patterns::AGENT_DIR, line.text, "agent")
                .filter(|agent| !is_primary_agent(agent))
        })?;
    trace!(agent, "skipping line from non-primary agent");
    Some(Classification::empty(line.observed_at))
}

fn is_primary_agent(agent: &str) -> bool {
    agent.trim().eq_ignore_ascii_case(PRIMARY_AGENT)
}

/// `All models failed (N): id: msg | id: msg` carries one reason per model.
fn aggregate_failure_rule(line: &Line<'_>) -> Option<Classification> {
    let body = patterns::capture_group(&patterns::ALL_MODELS_FAILED, line.text, "body")?;
    let mut out = Classification::empty(line.observed_at);

    for segment in body.split('|') {
        let Some((model_id, message)) = segment.trim().split_once(':') else {
            continue;
        };
        let (model_id, message) = (model_id.trim(), message.trim());

        // Free text can contain colons; only accept real model ids.
        if !model_id.contains('/') && !line.known.is_known(model_id) {
            continue;
        }

        if let Some(draft) = classify_message(message) {
            out.incidents
                .push(draft.into_incident(model_id, line.observed_at));
        }
    }

    Some(out)
}

/// A missing API key breaks every configured model of the provider.
fn no_api_key_rule(line: &Line<'_>) -> Option<Classification> {
    let provider = patterns::capture_group(&patterns::NO_API_KEY, line.text, "provider")?;
    let mut out = Classification::empty(line.observed_at);
    out.events.push(format!("provider={provider}: No API key"));
    out.incidents = fan_out(
        IncidentKind::NoApiKey,
        "missing credential: no API key configured for this provider.",
        line.catalog.by_provider(provider).map(|m| m.model_id.clone()),
        line.observed_at,
    );
    Some(out)
}

/// A provider cooldown that names no model applies to all of its models.
fn provider_cooldown_rule(line: &Line<'_>) -> Option<Classification> {
    if !line.attributed.is_empty() {
        return None;
    }
    let provider = patterns::capture_group(&patterns::COOLDOWN_PROVIDER, line.text, "provider")?;
    let mut out = Classification::empty(line.observed_at);
    out.events.push(format!("provider={provider}: cooldown"));
    out.incidents = fan_out(
        IncidentKind::ProviderCooldown,
        "Provider cooldown (every profile under this provider unavailable).",
        line.catalog.by_provider(provider).map(|m| m.model_id.clone()),
        line.observed_at,
    );
    Some(out)
}

fn unknown_model_rule(line: &Line<'_>) -> Option<Classification> {
    let model_id = patterns::capture_group(&patterns::UNKNOWN_MODEL, line.text, "model")
        .or_else(|| patterns::capture_group(&patterns::MODEL_NOT_ALLOWED, line.text, "model"))?;
    let mut out = Classification::empty(line.observed_at);
    out.events
        .push(format!("model={model_id}: Unknown/Not allowed"));
    out.incidents = fan_out(
        IncidentKind::UnknownModel,
        "Unknown model / not allowed",
        [model_id.to_owned()],
        line.observed_at,
    );
    Some(out)
}

fn attributed_rule(line: &Line<'_>) -> Option<Classification> {
    if line.attributed.is_empty() {
        return None;
    }
    let mut out = Classification::empty(line.observed_at);
    out.observed_models = line.attributed.clone();

    if let Some(draft) = classify_message(&line.message) {
        out.incidents = line
            .attributed
            .iter()
            .map(|model_id| draft.clone().into_incident(model_id, line.observed_at))
            .collect();
    }
    Some(out)
}

/// Keep a timeline breadcrumb for limits no model can be blamed for.
fn unattributed_rule(line: &Line<'_>) -> Option<Classification> {
    let message = Message::new(&line.message);
    let event = if message.is_rate_limit() {
        match reset_after_from_text(&line.message) {
            Some(hint) => format!("rate_limit(unknown model) ({})", recovery_text(&hint)),
            None => "rate_limit(unknown model)".to_owned(),
        }
    } else if message.is_context_limit() {
        "token/context limit (unknown model)".to_owned()
    } else {
        return None;
    };

    let mut out = Classification::empty(line.observed_at);
    out.events.push(event);
    Some(out)
}

/// Classifies gateway log lines against a model catalog.
#[derive(Debug, Clone, Copy)]
pub struct LineClassifier<'c> {
    catalog: &'c ModelCatalog,
}

impl<'c> LineClassifier<'c> {
    /// Create a classifier for the given catalog.
    pub fn new(catalog: &'c ModelCatalog) -> Self {
        Self { catalog }
    }

    /// The catalog lines are classified against.
    pub fn catalog(&self) -> &'c ModelCatalog {
        self.catalog
    }

    /// Classify one raw line.
    ///
    /// `known` decides which bare (slash-less) ids inside an aggregate
    /// failure line are trusted; pass the status matrix so observed models
    /// count as well as configured ones.
    pub fn classify(&self, text: &str, known: &dyn KnownModels) -> Classification {
        let line = Line::new(text, self.catalog, known);
        LINE_RULES
            .iter()
            .find_map(|(name, rule)| {
                let classification = rule(&line)?;
                trace!(rule = name, incidents = classification.incidents.len(), "line rule matched");
                Some(classification)
            })
            .unwrap_or_else(|| Classification::empty(line.observed_at))
    }
}
