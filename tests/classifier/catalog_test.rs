//! Tests for building the model catalog from the gateway config.

use guardian::catalog::{split_model_id, ModelCatalog, UNKNOWN_PROVIDER};
use serde_json::json;

#[test]
fn gateway_config_order_and_dedup() {
    let config = json!({
        "agents": {
            "defaults": {
                "model": {
                    "primary": "acme/gpt-x",
                    "fallbacks": ["other/m1", "acme/gpt-x", 42]
                },
                "models": {
                    "zeta/z": {},
                    "acme/gpt-y": { "alias": "y" }
                }
            },
            "list": [
                { "id": "main" },
                { "id": "buddy", "model": "other/m2" },
                { "id": "dup", "model": "zeta/z" }
            ]
        }
    });

    let catalog = ModelCatalog::from_gateway_config(&config);
    let ids: Vec<&str> = catalog.models().iter().map(|m| m.model_id.as_str()).collect();
    assert_eq!(ids, vec!["acme/gpt-x", "other/m1", "zeta/z", "acme/gpt-y", "other/m2"]);
}

#[test]
fn missing_config_is_empty_catalog() {
    let catalog = ModelCatalog::from_gateway_config(&serde_json::Value::Null);
    assert!(catalog.is_empty());
    assert_eq!(catalog.len(), 0);
}

#[test]
fn blank_ids_are_dropped() {
    let catalog = ModelCatalog::from_ids(["  ", "acme/gpt-x", " acme/gpt-x "]);
    assert_eq!(catalog.len(), 1);
}

#[test]
fn bare_ids_have_unknown_provider() {
    assert_eq!(split_model_id("local-model"), (UNKNOWN_PROVIDER, "local-model"));
    assert_eq!(split_model_id("acme/org/gpt"), ("acme", "org/gpt"));
}

#[test]
fn provider_lookup_and_mentions() {
    let catalog = ModelCatalog::from_ids(["acme/gpt-x", "acme/gpt-y", "other/m1"]);

    let acme: Vec<&str> = catalog.by_provider("acme").map(|m| m.model.as_str()).collect();
    assert_eq!(acme, vec!["gpt-x", "gpt-y"]);

    let mentioned: Vec<&str> = catalog
        .mentioned_in("fallback from other/m1 to acme/gpt-y")
        .map(|m| m.model_id.as_str())
        .collect();
    assert_eq!(mentioned, vec!["acme/gpt-y", "other/m1"]);

    assert!(catalog.contains("other/m1"));
    assert!(!catalog.contains("other/m2"));
}
