//! Health tiers for a model.

use serde::{Deserialize, Serialize};

/// Health tier of a model, ordered from best to worst.
///
/// The derived `Ord` follows badness, so `max` picks the worse tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Healthy.
    Green,
    /// Degraded or transiently limited.
    Yellow,
    /// Failing or misconfigured.
    Red,
}

impl Severity {
    /// Status glyph shown in front of the label.
    pub fn glyph(self) -> &'static str {
        match self {
            Self::Green => "\u{1f7e2}",
            Self::Yellow => "\u{1f7e1}",
            Self::Red => "\u{1f534}",
        }
    }

    /// The worse of two tiers.
    #[must_use]
    pub fn worse(self, other: Self) -> Self {
        self.max(other)
    }

    /// Whether this tier is [`Severity::Green`].
    pub fn is_healthy(self) -> bool {
        self == Self::Green
    }
}
