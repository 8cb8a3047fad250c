//! The recursive value tree config-related code operates over.
//!
//! Config snapshots, MCP/skill presets, and input-file descriptors all
//! arrive as loosely-typed JSON at the HTTP boundary and are stored as
//! `jsonb` in Postgres. Rather than threading `serde_json::Value` (and its
//! implicit `Any`-ness) through the resolver and stager, everything crosses
//! into [`ConfigValue`] at the boundary and the rest of the system matches
//! on it exhaustively.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A JSON-shaped value with exhaustive variants instead of an open `Value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// `null`.
    Null,
    /// `true` / `false`.
    Bool(bool),
    /// An integral number.
    Int(i64),
    /// A non-integral number.
    Float(f64),
    /// A string.
    String(String),
    /// An ordered list of values.
    List(Vec<ConfigValue>),
    /// A string-keyed map. `BTreeMap` keeps serialized output deterministic.
    Map(BTreeMap<String, ConfigValue>),
}

impl Default for ConfigValue {
    fn default() -> Self {
        ConfigValue::Null
    }
}

impl ConfigValue {
    /// Build an empty map.
    #[must_use]
    pub fn empty_map() -> Self {
        ConfigValue::Map(BTreeMap::new())
    }

    /// Borrow this value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Borrow this value as a map, if it is one.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow this value as a list, if it is one.
    #[must_use]
    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Borrow this value as a bool, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// `true` for [`ConfigValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Null)
    }

    /// Returns `true` if this is a non-empty map whose every value is a bool.
    ///
    /// This is the shape-detection rule the MCP resolver uses to tell a
    /// toggle map (`{"1": true, "2": false}`) apart from an already-expanded
    /// configuration map (`{"svc": {"cmd": "x"}}`).
    #[must_use]
    pub fn is_bool_toggle_map(&self) -> bool {
        match self {
            ConfigValue::Map(m) => !m.is_empty() && m.values().all(|v| matches!(v, ConfigValue::Bool(_))),
            _ => false,
        }
    }
}

impl From<serde_json::Value> for ConfigValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ConfigValue::Null,
            serde_json::Value::Bool(b) => ConfigValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ConfigValue::Int(i)
                } else {
                    ConfigValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => ConfigValue::String(s),
            serde_json::Value::Array(items) => {
                ConfigValue::List(items.into_iter().map(ConfigValue::from).collect())
            }
            serde_json::Value::Object(map) => ConfigValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, ConfigValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<ConfigValue> for serde_json::Value {
    fn from(value: ConfigValue) -> Self {
        match value {
            ConfigValue::Null => serde_json::Value::Null,
            ConfigValue::Bool(b) => serde_json::Value::Bool(b),
            ConfigValue::Int(i) => serde_json::Value::Number(i.into()),
            ConfigValue::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ConfigValue::String(s) => serde_json::Value::String(s),
            ConfigValue::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            ConfigValue::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_json() {
        let json = serde_json::json!({
            "a": 1,
            "b": [true, false, null],
            "c": {"nested": "x"},
            "d": 1.5,
        });
        let value: ConfigValue = json.clone().into();
        let back: serde_json::Value = value.into();
        assert_eq!(json, back);
    }

    #[test]
    fn detects_bool_toggle_maps() {
        let toggles: ConfigValue = serde_json::json!({"1": true, "2": false}).into();
        assert!(toggles.is_bool_toggle_map());

        let expanded: ConfigValue = serde_json::json!({"svc": {"cmd": "x"}}).into();
        assert!(!expanded.is_bool_toggle_map());

        let empty = ConfigValue::empty_map();
        assert!(!empty.is_bool_toggle_map());
    }

    #[test]
    fn mixed_toggle_values_are_not_a_toggle_map() {
        let mixed: ConfigValue = serde_json::json!({"1": true, "2": "nope"}).into();
        assert!(!mixed.is_bool_toggle_map());
    }
}
