//! How long an incident keeps affecting a model's current health.
//!
//! Each incident kind has a sticky window anchored at the line's timestamp.
//! Rate limits with a parsed reset hint use the hint instead. Missing
//! credentials and invalid models never expire within a report.

use chrono::{DateTime, TimeDelta, Utc};

use crate::classifier::{Incident, IncidentKind};

/// Default sticky window for cooldowns, in minutes.
pub const DEFAULT_COOLDOWN_STICKY_MINUTES: u32 = 240;
/// Default sticky window for rate limits without a reset hint, in minutes.
pub const DEFAULT_RATE_LIMIT_STICKY_MINUTES: u32 = 30;

const TIMEOUT_STICKY_MINUTES: i64 = 30;
const CONTEXT_LIMIT_STICKY_HOURS: i64 = 6;

/// When an incident stops counting as active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickyUntil {
    /// Active while the evaluation instant is before this instant.
    Until(DateTime<Utc>),
    /// Active for the whole report once seen.
    Always,
    /// Never active: no timestamp to anchor the window.
    Never,
}

/// Sticky-window policy parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StickinessPolicy {
    /// Window for cooldowns (model and provider scope).
    pub cooldown: TimeDelta,
    /// Window for rate limits without a parsed reset hint.
    pub rate_limit: TimeDelta,
}

impl Default for StickinessPolicy {
    fn default() -> Self {
        Self::from_minutes(
            DEFAULT_COOLDOWN_STICKY_MINUTES,
            DEFAULT_RATE_LIMIT_STICKY_MINUTES,
        )
    }
}

impl StickinessPolicy {
    /// Build a policy from the two configurable windows, in minutes.
    pub fn from_minutes(cooldown_minutes: u32, rate_limit_minutes: u32) -> Self {
        Self {
            cooldown: TimeDelta::minutes(i64::from(cooldown_minutes)),
            rate_limit: TimeDelta::minutes(i64::from(rate_limit_minutes)),
        }
    }

    /// The sticky window for `kind`, or `None` for kinds that never expire.
    ///
    /// `reset_after` is the parsed rate-limit reset hint, if any.
    pub fn window(&self, kind: IncidentKind, reset_after: Option<TimeDelta>) -> Option<TimeDelta> {
        match kind {
            IncidentKind::Cooldown | IncidentKind::ProviderCooldown => Some(self.cooldown),
            IncidentKind::RateLimitShort | IncidentKind::RateLimitLong => {
                Some(reset_after.unwrap_or(self.rate_limit))
            }
            IncidentKind::RateLimitUnbounded => Some(self.rate_limit),
            IncidentKind::Timeout => Some(TimeDelta::minutes(TIMEOUT_STICKY_MINUTES)),
            IncidentKind::ContextLimit => Some(TimeDelta::hours(CONTEXT_LIMIT_STICKY_HOURS)),
            IncidentKind::NoApiKey | IncidentKind::UnknownModel => None,
        }
    }

    /// Compute when `incident` stops being active.
    pub fn sticky_until(&self, incident: &Incident) -> StickyUntil {
        let Some(window) = self.window(incident.kind, incident.reset_after()) else {
            return StickyUntil::Always;
        };
        match incident.observed_at {
            // An unrepresentable end instant means "far future".
            Some(at) => at
                .checked_add_signed(window)
                .map_or(StickyUntil::Always, StickyUntil::Until),
            None => StickyUntil::Never,
        }
    }

    /// Whether `incident` still affects health at `now`.
    pub fn is_active(&self, incident: &Incident, now: DateTime<Utc>) -> bool {
        match self.sticky_until(incident) {
            StickyUntil::Until(until) => now < until,
            StickyUntil::Always => true,
            StickyUntil::Never => false,
        }
    }
}
