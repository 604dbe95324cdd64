// SPDX-License-Identifier: MIT OR Apache-2.0
//! Two-layer deduplication store: delivery IDs and content fingerprints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted dedup state: `processed_deliveries.json`.
///
/// `BTreeMap` (rather than `HashMap`) so `serde_json::to_vec_pretty` emits
/// sorted keys for human auditability, matching the original's
/// `json.dumps(..., sort_keys=True)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessedState {
    /// Delivery IDs already handled.
    #[serde(default)]
    pub deliveries: BTreeMap<String, bool>,
    /// Content fingerprints already handled.
    #[serde(default)]
    pub fingerprints: BTreeMap<String, bool>,
}

impl ProcessedState {
    /// Parse state from its on-disk JSON text, tolerating the legacy flat
    /// shape: a bare `{delivery_id: true}` map with no `fingerprints` key.
    /// Malformed JSON yields empty defaults, same as the original's
    /// broad `except Exception: return {...}` fallback.
    pub fn from_json_str(raw: &str) -> Self {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
            return Self::default();
        };
        Self::from_value(value)
    }

    fn from_value(value: serde_json::Value) -> Self {
        let serde_json::Value::Object(map) = value else {
            return Self::default();
        };
        if map.contains_key("deliveries") || map.contains_key("fingerprints") {
            let deliveries = map
                .get("deliveries")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            let fingerprints = map
                .get("fingerprints")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            return Self {
                deliveries,
                fingerprints,
            };
        }
        let deliveries = serde_json::from_value(serde_json::Value::Object(map)).unwrap_or_default();
        Self {
            deliveries,
            fingerprints: BTreeMap::new(),
        }
    }

    /// `true` if this delivery ID has already been processed.
    pub fn has_delivery(&self, delivery_id: &str) -> bool {
        !delivery_id.is_empty() && self.deliveries.get(delivery_id).copied().unwrap_or(false)
    }

    /// `true` if this content fingerprint has already been processed.
    pub fn has_fingerprint(&self, fingerprint: &str) -> bool {
        self.fingerprints.get(fingerprint).copied().unwrap_or(false)
    }

    /// Mark a delivery ID (if non-empty) and fingerprint as processed.
    pub fn mark_processed(&mut self, delivery_id: &str, fingerprint: &str) {
        if !delivery_id.is_empty() {
            self.deliveries.insert(delivery_id.to_string(), true);
        }
        self.fingerprints.insert(fingerprint.to_string(), true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_defaults() {
        let state = ProcessedState::from_json_str("not json at all");
        assert!(state.deliveries.is_empty());
        assert!(state.fingerprints.is_empty());
    }

    #[test]
    fn legacy_flat_map_is_normalized() {
        let state = ProcessedState::from_json_str(r#"{"abc-123": true, "def-456": true}"#);
        assert!(state.has_delivery("abc-123"));
        assert!(state.has_delivery("def-456"));
        assert!(state.fingerprints.is_empty());
    }

    #[test]
    fn current_shape_round_trips() {
        let mut state = ProcessedState::default();
        state.mark_processed("d1", "fp1");
        let json = serde_json::to_string(&state).unwrap();
        let parsed = ProcessedState::from_json_str(&json);
        assert!(parsed.has_delivery("d1"));
        assert!(parsed.has_fingerprint("fp1"));
    }

    #[test]
    fn mark_processed_skips_empty_delivery_id() {
        let mut state = ProcessedState::default();
        state.mark_processed("", "fp-only");
        assert!(state.deliveries.is_empty());
        assert!(state.has_fingerprint("fp-only"));
    }

    #[test]
    fn serialization_sorts_keys() {
        let mut state = ProcessedState::default();
        state.mark_processed("zzz", "fp-z");
        state.mark_processed("aaa", "fp-a");
        let json = serde_json::to_string(&state).unwrap();
        let aaa = json.find("aaa").unwrap();
        let zzz = json.find("zzz").unwrap();
        assert!(aaa < zzz);
    }
}
