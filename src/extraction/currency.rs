//! Currency marker normalization
//!
//! Rewrites the source marker (`$` by default) into the target marker
//! (`₹` by default) in strings and, recursively, in JSON payloads.

use crate::config::CurrencyConfig;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyNormalizer {
    source_marker: String,
    target_marker: String,
}

impl CurrencyNormalizer {
    pub fn new(source_marker: impl Into<String>, target_marker: impl Into<String>) -> Self {
        Self {
            source_marker: source_marker.into(),
            target_marker: target_marker.into(),
        }
    }

    /// Falls back to the default markers when the pair is invalid
    pub fn from_config(config: &CurrencyConfig) -> Self {
        let config = config.clone().validated();
        Self::new(config.source_marker, config.target_marker)
    }

    pub fn source_marker(&self) -> &str {
        &self.source_marker
    }

    pub fn target_marker(&self) -> &str {
        &self.target_marker
    }

    fn is_noop(&self) -> bool {
        self.source_marker.is_empty() || self.source_marker == self.target_marker
    }

    /// Replace every source marker in `value`
    pub fn normalize_str(&self, value: &str) -> String {
        if self.is_noop() {
            return value.to_string();
        }
        value.replace(&self.source_marker, &self.target_marker)
    }

    /// Normalize every string leaf. Object keys, numbers, booleans and null
    /// are left as they are.
    pub fn normalize_value(&self, mut value: Value) -> Value {
        self.normalize_in_place(&mut value);
        value
    }

    pub fn normalize_in_place(&self, value: &mut Value) {
        if self.is_noop() {
            return;
        }
        match value {
            Value::String(s) => {
                if s.contains(self.source_marker.as_str()) {
                    *s = self.normalize_str(s);
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.normalize_in_place(item);
                }
            }
            Value::Object(map) => {
                for entry in map.values_mut() {
                    self.normalize_in_place(entry);
                }
            }
            Value::Number(_) | Value::Bool(_) | Value::Null => {}
        }
    }
}

impl Default for CurrencyNormalizer {
    fn default() -> Self {
        Self::from_config(&CurrencyConfig::default())
    }
}
