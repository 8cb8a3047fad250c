//! Environment-variable substitution over a [`ConfigValue`] tree.
//!
//! Grammar recognised inside `${...}`:
//! - `env:NAME` — look up `NAME`; error if absent (no default allowed).
//! - `NAME:-DEFAULT` — look up `NAME`; fall back to the literal `DEFAULT`.
//! - `NAME` — look up `NAME`; error if absent.

use cp_core::ConfigValue;
use cp_error::{CpError, ErrorCode};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("static pattern is valid"));

/// Recursively substitute `${...}` references throughout `value`.
pub fn substitute(value: &ConfigValue, env_map: &BTreeMap<String, String>) -> Result<ConfigValue, CpError> {
    match value {
        ConfigValue::String(s) => substitute_string(s, env_map).map(ConfigValue::String),
        ConfigValue::List(items) => items
            .iter()
            .map(|v| substitute(v, env_map))
            .collect::<Result<Vec<_>, _>>()
            .map(ConfigValue::List),
        ConfigValue::Map(map) => map
            .iter()
            .map(|(k, v)| substitute(v, env_map).map(|v| (k.clone(), v)))
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(ConfigValue::Map),
        other => Ok(other.clone()),
    }
}

fn substitute_string(s: &str, env_map: &BTreeMap<String, String>) -> Result<String, CpError> {
    if !TOKEN_PATTERN.is_match(s) {
        return Ok(s.to_string());
    }
    let mut resolved = s.to_string();
    for caps in TOKEN_PATTERN.captures_iter(s) {
        let token = &caps[1];
        let (var, default) = if let Some(name) = token.strip_prefix("env:") {
            (name, None)
        } else if let Some((name, default)) = token.split_once(":-") {
            (name, Some(default))
        } else {
            (token, None)
        };

        let value = if let Some(v) = env_map.get(var) {
            v.clone()
        } else if let Some(default) = default {
            default.to_string()
        } else {
            return Err(CpError::new(
                ErrorCode::EnvVarNotFound,
                format!("env var not found: {var}"),
            )
            .with_context("var", var));
        };

        let placeholder = format!("${{{token}}}");
        resolved = resolved.replace(&placeholder, &value);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn plain_string_passes_through() {
        let env = env(&[]);
        assert_eq!(substitute_string("no tokens here", &env).unwrap(), "no tokens here");
    }

    #[test]
    fn env_prefixed_token_requires_exact_var() {
        let env = env(&[("FOO", "bar")]);
        assert_eq!(substitute_string("${env:FOO}", &env).unwrap(), "bar");
    }

    #[test]
    fn bare_token_looked_up_directly() {
        let env = env(&[("FOO", "bar")]);
        assert_eq!(substitute_string("${FOO}/x", &env).unwrap(), "bar/x");
    }

    #[test]
    fn default_used_when_missing() {
        let env = env(&[]);
        assert_eq!(substitute_string("${MISSING:-zed}", &env).unwrap(), "zed");
    }

    #[test]
    fn missing_without_default_errors() {
        let env = env(&[]);
        let err = substitute_string("${MISSING}", &env).unwrap_err();
        assert_eq!(err.code, ErrorCode::EnvVarNotFound);
    }

    #[test]
    fn multiple_tokens_in_one_string() {
        let env = env(&[("FOO", "bar")]);
        let out = substitute_string("${FOO}/x ${MISSING:-zed} ${env:FOO}", &env).unwrap();
        assert_eq!(out, "bar/x zed bar");
    }

    #[test]
    fn recurses_through_lists_and_maps() {
        let env = env(&[("FOO", "bar")]);
        let value: ConfigValue = serde_json::json!({
            "u": "${FOO}/x",
            "list": ["${FOO}", 1, null],
        })
        .into();
        let resolved = substitute(&value, &env).unwrap();
        let back: serde_json::Value = resolved.into();
        assert_eq!(
            back,
            serde_json::json!({"u": "bar/x", "list": ["bar", 1, null]})
        );
    }

    #[test]
    fn non_string_scalars_pass_through() {
        let env = env(&[]);
        let value = ConfigValue::Int(42);
        assert_eq!(substitute(&value, &env).unwrap(), ConfigValue::Int(42));
    }

    proptest! {
        #[test]
        fn substitution_is_idempotent_on_already_substituted_strings(
            name in "[A-Z]{1,8}",
            val in "[a-zA-Z0-9 _/-]{0,16}",
        ) {
            // val intentionally excludes '$' and braces so a second pass over
            // the substituted output never finds a new token to resolve.
            let mut env_map = BTreeMap::new();
            env_map.insert(name.clone(), val.clone());
            let input = format!("prefix-${{{name}}}-suffix");
            let once = substitute_string(&input, &env_map).unwrap();
            let twice = substitute_string(&once, &env_map).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
