//! Normalization helpers for MCP/skill preset id lists.

use cp_core::ConfigValue;

/// Parse a loosely-typed id list (ints or decimal strings) into a
/// deduplicated, first-seen-order list of `i64`s.
///
/// Non-list values, and list entries that are neither an int nor a
/// parseable decimal string, are dropped rather than erroring — this
/// mirrors the forgiving normalization the original service applied to
/// caller-supplied `mcp_server_ids`/`skill_ids` fields.
#[must_use]
pub fn normalize_ids(value: Option<&ConfigValue>) -> Vec<i64> {
    let Some(ConfigValue::List(items)) = value else {
        return Vec::new();
    };
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let id = match item {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    trimmed.parse::<i64>().ok()
                }
            }
            _ => None,
        };
        let Some(id) = id else { continue };
        if seen.insert(id) {
            out.push(id);
        }
    }
    out
}

/// Convert a `{preset_id: bool}` toggle map into an enabled-id list.
///
/// Returns `None` when `value` does not look like a toggle map at all (not
/// a map, or some value isn't a bool, or some key isn't a decimal integer);
/// callers treat `None` as "already-expanded config, use verbatim". An empty
/// map IS a valid (empty) toggle map and yields `Some(vec![])`.
#[must_use]
pub fn extract_enabled_ids_from_toggles(value: Option<&ConfigValue>) -> Option<Vec<i64>> {
    let ConfigValue::Map(map) = value? else {
        return None;
    };
    if map.is_empty() {
        return Some(Vec::new());
    }
    let mut seen = std::collections::HashSet::new();
    let mut ids = Vec::new();
    for (key, enabled) in map {
        let enabled = match enabled {
            ConfigValue::Bool(b) => *b,
            _ => return None,
        };
        if !enabled {
            continue;
        }
        let trimmed = key.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(id) = trimmed.parse::<i64>() else {
            return None;
        };
        if seen.insert(id) {
            ids.push(id);
        }
    }
    Some(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids_value(items: &[&str]) -> ConfigValue {
        ConfigValue::List(items.iter().map(|s| ConfigValue::String((*s).into())).collect())
    }

    #[test]
    fn normalize_mixed_types_and_dedup() {
        let value = ConfigValue::List(vec![
            ConfigValue::Int(1),
            ConfigValue::String(" 2 ".into()),
            ConfigValue::String("2".into()),
            ConfigValue::String("".into()),
            ConfigValue::String("x".into()),
            ConfigValue::Bool(true),
            ConfigValue::Int(3),
        ]);
        assert_eq!(normalize_ids(Some(&value)), vec![1, 2, 3]);
    }

    #[test]
    fn normalize_non_list_is_empty() {
        assert_eq!(normalize_ids(Some(&ConfigValue::Null)), Vec::<i64>::new());
        assert_eq!(normalize_ids(None), Vec::<i64>::new());
    }

    #[test]
    fn normalize_preserves_first_seen_order() {
        let value = ids_value(&["3", "1", "2", "1"]);
        assert_eq!(normalize_ids(Some(&value)), vec![3, 1, 2]);
    }

    #[test]
    fn toggles_empty_map_is_some_empty() {
        assert_eq!(
            extract_enabled_ids_from_toggles(Some(&ConfigValue::empty_map())),
            Some(Vec::new())
        );
    }

    #[test]
    fn toggles_non_map_is_none() {
        assert_eq!(extract_enabled_ids_from_toggles(Some(&ConfigValue::Null)), None);
        assert_eq!(extract_enabled_ids_from_toggles(None), None);
    }

    #[test]
    fn toggles_extracts_only_true_entries() {
        let value: ConfigValue =
            serde_json::json!({"1": true, "2": false, "3": true}).into();
        assert_eq!(
            extract_enabled_ids_from_toggles(Some(&value)),
            Some(vec![1, 3])
        );
    }

    #[test]
    fn toggles_non_bool_value_is_none() {
        let value: ConfigValue = serde_json::json!({"1": true, "2": "nope"}).into();
        assert_eq!(extract_enabled_ids_from_toggles(Some(&value)), None);
    }

    #[test]
    fn toggles_non_numeric_key_is_none() {
        let value: ConfigValue = serde_json::json!({"abc": true}).into();
        assert_eq!(extract_enabled_ids_from_toggles(Some(&value)), None);
    }

    proptest! {
        #[test]
        fn normalize_ids_is_idempotent_on_its_own_output(ids in proptest::collection::vec(-1000i64..1000, 0..20)) {
            let value = ConfigValue::List(ids.iter().map(|i| ConfigValue::Int(*i)).collect());
            let once = normalize_ids(Some(&value));
            let as_value = ConfigValue::List(once.iter().map(|i| ConfigValue::Int(*i)).collect());
            let twice = normalize_ids(Some(&as_value));
            prop_assert_eq!(once, twice);
        }
    }
}
