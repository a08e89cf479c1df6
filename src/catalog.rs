//! Configured model references.
//!
//! The gateway config names models in several places (primary, fallbacks,
//! the allowlist map and per-agent overrides). The catalog flattens them
//! into one deduplicated list that keeps first-seen order.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;

/// Provider name used for model ids without a `provider/` prefix.
pub const UNKNOWN_PROVIDER: &str = "unknown";

/// A configured model, resolved to provider and model name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ModelReference {
    /// `provider/model`, or the bare model name when no provider is given.
    pub model_id: String,
    /// Provider part of the id, or [`UNKNOWN_PROVIDER`].
    pub provider: String,
    /// Model part of the id.
    pub model: String,
}

impl ModelReference {
    /// Build a reference from a model id, splitting on the first `/`.
    pub fn from_id(model_id: &str) -> Self {
        let (provider, model) = split_model_id(model_id);
        Self {
            model_id: model_id.to_owned(),
            provider: provider.to_owned(),
            model: model.to_owned(),
        }
    }
}

/// Split `provider/model` on the first slash.
///
/// Ids without a slash belong to the [`UNKNOWN_PROVIDER`].
pub fn split_model_id(model_id: &str) -> (&str, &str) {
    model_id
        .split_once('/')
        .unwrap_or((UNKNOWN_PROVIDER, model_id))
}

/// Ordered, deduplicated set of configured models.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: Vec<ModelReference>,
    by_provider_model: HashMap<(String, String), usize>,
}

impl ModelCatalog {
    /// Build a catalog from raw model ids, dropping blanks and duplicates.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut catalog = Self::default();

        for id in ids {
            let id = id.as_ref().trim();
            if id.is_empty() || !seen.insert(id.to_owned()) {
                continue;
            }
            let reference = ModelReference::from_id(id);
            catalog
                .by_provider_model
                .entry((reference.provider.clone(), reference.model.clone()))
                .or_insert(catalog.models.len());
            catalog.models.push(reference);
        }

        catalog
    }

    /// Build a catalog from the gateway's JSON configuration.
    ///
    /// Reads, in order: `agents.defaults.model.primary`,
    /// `agents.defaults.model.fallbacks[]`, the keys of
    /// `agents.defaults.models`, then `agents.list[].model`. Values of the
    /// wrong type are ignored.
    pub fn from_gateway_config(config: &Value) -> Self {
        let mut ids: Vec<&str> = Vec::new();
        let defaults = &config["agents"]["defaults"];
        let model_conf = &defaults["model"];

        if let Some(primary) = model_conf["primary"].as_str() {
            ids.push(primary);
        }

        if let Some(fallbacks) = model_conf["fallbacks"].as_array() {
            ids.extend(fallbacks.iter().filter_map(Value::as_str));
        }

        if let Some(allowlist) = defaults["models"].as_object() {
            ids.extend(allowlist.keys().map(String::as_str));
        }

        if let Some(agents) = config["agents"]["list"].as_array() {
            ids.extend(agents.iter().filter_map(|agent| agent["model"].as_str()));
        }

        Self::from_ids(ids)
    }

    /// All configured models in first-seen order.
    pub fn models(&self) -> &[ModelReference] {
        &self.models
    }

    /// Whether the catalog has no models.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Number of configured models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether `model_id` is configured.
    pub fn contains(&self, model_id: &str) -> bool {
        self.models.iter().any(|m| m.model_id == model_id)
    }

    /// Resolve explicit `provider=` / `model=` markers to a configured entry.
    pub fn resolve(&self, provider: &str, model: &str) -> Option<&ModelReference> {
        self.by_provider_model
            .get(&(provider.to_owned(), model.to_owned()))
            .and_then(|&idx| self.models.get(idx))
    }

    /// Every configured model served by `provider`.
    pub fn by_provider<'a>(&'a self, provider: &'a str) -> impl Iterator<Item = &'a ModelReference> {
        self.models.iter().filter(move |m| m.provider == provider)
    }

    /// Configured models whose id occurs verbatim in `line`.
    pub fn mentioned_in<'a>(&'a self, line: &'a str) -> impl Iterator<Item = &'a ModelReference> {
        self.models
            .iter()
            .filter(move |m| line.contains(m.model_id.as_str()))
    }
}
