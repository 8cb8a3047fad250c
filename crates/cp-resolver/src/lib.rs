// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-user configuration resolution for the agent-execution control plane.
//!
//! [`Resolver::resolve`] takes a user id and a run's `config_snapshot` and
//! produces the effective configuration the executor receives: MCP servers
//! and skill bundles expanded from preset ids (or passed through if already
//! expanded), with every `${...}` environment reference substituted. Side
//! reads (env vars, presets, user overrides) go through the [`SideReads`]
//! trait so this crate stays pure and unit-testable without a database.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ids;
mod substitute;

pub use ids::{extract_enabled_ids_from_toggles, normalize_ids};
pub use substitute::substitute;

use async_trait::async_trait;
use cp_core::ConfigValue;
use cp_error::CpError;
use std::collections::BTreeMap;

/// Side reads the resolver needs but does not own: per-user env vars and
/// preset expansion. Implemented against `cp-db` in the backend process and
/// against an HTTP client proxying to the backend's internal endpoints in
/// the executor manager process.
#[async_trait]
pub trait SideReads: Send + Sync {
    /// Fetch the user's environment variable map.
    async fn env_map(&self, user_id: &str) -> Result<BTreeMap<String, String>, CpError>;

    /// Resolve a set of MCP preset ids (plus the user's per-preset
    /// overrides) into a full `{server_name: config}` map.
    async fn resolve_mcp_config(
        &self,
        user_id: &str,
        server_ids: &[i64],
    ) -> Result<ConfigValue, CpError>;

    /// Resolve a set of installed skill preset ids into a full
    /// `{skill_name: entries}` map.
    async fn resolve_skill_config(
        &self,
        user_id: &str,
        skill_ids: &[i64],
    ) -> Result<ConfigValue, CpError>;
}

/// Stateless resolver bound to a concrete [`SideReads`] implementation.
pub struct Resolver<'a, R: SideReads> {
    side_reads: &'a R,
}

impl<'a, R: SideReads> Resolver<'a, R> {
    /// Wrap a [`SideReads`] implementation.
    pub fn new(side_reads: &'a R) -> Self {
        Self { side_reads }
    }

    /// Produce the effective configuration for a run.
    ///
    /// `config_snapshot` is expected to be a [`ConfigValue::Map`]; any other
    /// shape is returned unchanged (nothing to resolve).
    pub async fn resolve(
        &self,
        user_id: &str,
        config_snapshot: &ConfigValue,
    ) -> Result<ConfigValue, CpError> {
        let ConfigValue::Map(snapshot) = config_snapshot else {
            return Ok(config_snapshot.clone());
        };

        let env_map = self.side_reads.env_map(user_id).await?;

        let mcp_config = self.resolve_effective_mcp_config(user_id, snapshot).await?;
        let skill_files = self.resolve_effective_skill_files(user_id, snapshot).await?;
        let input_files = snapshot.get("input_files").cloned().unwrap_or(ConfigValue::List(Vec::new()));

        let resolved_mcp = resolve_mcp(&mcp_config, &env_map)?;
        let resolved_skills = resolve_skills(&skill_files, &env_map)?;
        let resolved_inputs = substitute(&input_files, &env_map)?;

        let mut resolved = snapshot.clone();
        resolved.insert("mcp_config".to_string(), resolved_mcp);
        resolved.insert("skill_files".to_string(), resolved_skills);
        resolved.insert("input_files".to_string(), resolved_inputs);
        Ok(ConfigValue::Map(resolved))
    }

    /// Resolve MCP config for execution.
    ///
    /// Priority:
    /// 1. `mcp_server_ids` present → fetch full config via [`SideReads::resolve_mcp_config`].
    /// 2. `mcp_config` is a toggle map (`{preset_id: bool}`) → fetch enabled ids identically.
    /// 3. Otherwise `mcp_config` is already-expanded; pass through (or an empty map).
    async fn resolve_effective_mcp_config(
        &self,
        user_id: &str,
        snapshot: &BTreeMap<String, ConfigValue>,
    ) -> Result<ConfigValue, CpError> {
        let server_ids = normalize_ids(snapshot.get("mcp_server_ids"));
        if !server_ids.is_empty() {
            return self.side_reads.resolve_mcp_config(user_id, &server_ids).await;
        }

        let mcp_config = snapshot.get("mcp_config");
        if let Some(toggle_ids) = extract_enabled_ids_from_toggles(mcp_config) {
            return self.side_reads.resolve_mcp_config(user_id, &toggle_ids).await;
        }

        Ok(match mcp_config {
            Some(v @ ConfigValue::Map(_)) => v.clone(),
            _ => ConfigValue::empty_map(),
        })
    }

    /// Resolve skill config for execution.
    ///
    /// Priority:
    /// 1. `skill_ids` present → fetch entries via [`SideReads::resolve_skill_config`].
    /// 2. Otherwise `skill_files` is already-expanded; pass through (or an empty map).
    async fn resolve_effective_skill_files(
        &self,
        user_id: &str,
        snapshot: &BTreeMap<String, ConfigValue>,
    ) -> Result<ConfigValue, CpError> {
        let skill_ids = normalize_ids(snapshot.get("skill_ids"));
        if !skill_ids.is_empty() {
            return self.side_reads.resolve_skill_config(user_id, &skill_ids).await;
        }

        Ok(match snapshot.get("skill_files") {
            Some(v @ ConfigValue::Map(_)) => v.clone(),
            _ => ConfigValue::empty_map(),
        })
    }
}

fn resolve_mcp(mcp_config: &ConfigValue, env_map: &BTreeMap<String, String>) -> Result<ConfigValue, CpError> {
    let ConfigValue::Map(map) = mcp_config else {
        return Ok(ConfigValue::empty_map());
    };
    let mut resolved = BTreeMap::new();
    for (name, config) in map {
        let value = match config {
            ConfigValue::Map(_) => substitute(config, env_map)?,
            other => other.clone(),
        };
        resolved.insert(name.clone(), value);
    }
    Ok(ConfigValue::Map(resolved))
}

fn resolve_skills(skills: &ConfigValue, env_map: &BTreeMap<String, String>) -> Result<ConfigValue, CpError> {
    let ConfigValue::Map(map) = skills else {
        return Ok(ConfigValue::empty_map());
    };
    let mut resolved = BTreeMap::new();
    for (name, config) in map {
        let ConfigValue::Map(entries) = config else {
            continue;
        };
        if matches!(entries.get("enabled"), Some(ConfigValue::Bool(false))) {
            let mut disabled = BTreeMap::new();
            disabled.insert("enabled".to_string(), ConfigValue::Bool(false));
            resolved.insert(name.clone(), ConfigValue::Map(disabled));
            continue;
        }
        resolved.insert(name.clone(), substitute(config, env_map)?);
    }
    Ok(ConfigValue::Map(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cp_error::ErrorCode;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSideReads {
        env: BTreeMap<String, String>,
        mcp_presets: BTreeMap<i64, ConfigValue>,
        skill_presets: BTreeMap<i64, ConfigValue>,
        mcp_calls: Mutex<Vec<Vec<i64>>>,
    }

    #[async_trait]
    impl SideReads for FakeSideReads {
        async fn env_map(&self, _user_id: &str) -> Result<BTreeMap<String, String>, CpError> {
            Ok(self.env.clone())
        }

        async fn resolve_mcp_config(
            &self,
            _user_id: &str,
            server_ids: &[i64],
        ) -> Result<ConfigValue, CpError> {
            self.mcp_calls.lock().unwrap().push(server_ids.to_vec());
            let mut out = BTreeMap::new();
            for id in server_ids {
                if let Some(cfg) = self.mcp_presets.get(id) {
                    out.insert(format!("server-{id}"), cfg.clone());
                }
            }
            Ok(ConfigValue::Map(out))
        }

        async fn resolve_skill_config(
            &self,
            _user_id: &str,
            skill_ids: &[i64],
        ) -> Result<ConfigValue, CpError> {
            let mut out = BTreeMap::new();
            for id in skill_ids {
                if let Some(entries) = self.skill_presets.get(id) {
                    out.insert(format!("skill-{id}"), entries.clone());
                }
            }
            Ok(ConfigValue::Map(out))
        }
    }

    #[tokio::test]
    async fn resolves_mcp_server_ids_priority() {
        let mut side = FakeSideReads::default();
        side.mcp_presets.insert(
            1,
            serde_json::json!({"cmd": "x", "token": "${env:TOKEN}"}).into(),
        );
        side.env.insert("TOKEN".into(), "secret".into());
        let resolver = Resolver::new(&side);

        let snapshot: ConfigValue = serde_json::json!({
            "mcp_server_ids": [1, "1"],
        })
        .into();
        let resolved = resolver.resolve("u1", &snapshot).await.unwrap();
        let back: serde_json::Value = resolved.into();
        assert_eq!(
            back["mcp_config"],
            serde_json::json!({"server-1": {"cmd": "x", "token": "secret"}})
        );
        assert_eq!(*side.mcp_calls.lock().unwrap(), vec![vec![1]]);
    }

    #[tokio::test]
    async fn resolves_mcp_toggle_map_priority() {
        let mut side = FakeSideReads::default();
        side.mcp_presets.insert(2, serde_json::json!({"cmd": "y"}).into());
        let resolver = Resolver::new(&side);

        let snapshot: ConfigValue = serde_json::json!({
            "mcp_config": {"2": true, "3": false},
        })
        .into();
        let resolved = resolver.resolve("u1", &snapshot).await.unwrap();
        let back: serde_json::Value = resolved.into();
        assert_eq!(back["mcp_config"], serde_json::json!({"server-2": {"cmd": "y"}}));
    }

    #[tokio::test]
    async fn legacy_expanded_mcp_config_passes_through() {
        let side = FakeSideReads::default();
        let resolver = Resolver::new(&side);

        let snapshot: ConfigValue = serde_json::json!({
            "mcp_config": {"custom": {"cmd": "z"}},
        })
        .into();
        let resolved = resolver.resolve("u1", &snapshot).await.unwrap();
        let back: serde_json::Value = resolved.into();
        assert_eq!(back["mcp_config"], serde_json::json!({"custom": {"cmd": "z"}}));
    }

    #[tokio::test]
    async fn disabled_skill_collapses_and_skips_substitution() {
        let side = FakeSideReads::default();
        let resolver = Resolver::new(&side);

        let snapshot: ConfigValue = serde_json::json!({
            "skill_files": {"s": {"enabled": false, "token": "${MISSING}"}},
        })
        .into();
        let resolved = resolver.resolve("u1", &snapshot).await.unwrap();
        let back: serde_json::Value = resolved.into();
        assert_eq!(back["skill_files"], serde_json::json!({"s": {"enabled": false}}));
    }

    #[tokio::test]
    async fn missing_env_var_propagates_error() {
        let side = FakeSideReads::default();
        let resolver = Resolver::new(&side);

        let snapshot: ConfigValue = serde_json::json!({
            "skill_files": {"s": {"enabled": true, "token": "${MISSING}"}},
        })
        .into();
        let err = resolver.resolve("u1", &snapshot).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EnvVarNotFound);
    }

    #[tokio::test]
    async fn input_files_receive_env_substitution() {
        let mut side = FakeSideReads::default();
        side.env.insert("HOME_DIR".into(), "/home/u1".into());
        let resolver = Resolver::new(&side);

        let snapshot: ConfigValue = serde_json::json!({
            "input_files": [{"id": "a", "type": "file", "source": "${HOME_DIR}/a.txt"}],
        })
        .into();
        let resolved = resolver.resolve("u1", &snapshot).await.unwrap();
        let back: serde_json::Value = resolved.into();
        assert_eq!(back["input_files"][0]["source"], "/home/u1/a.txt");
    }

    #[tokio::test]
    async fn non_map_snapshot_passes_through_unchanged() {
        let side = FakeSideReads::default();
        let resolver = Resolver::new(&side);
        let snapshot = ConfigValue::Null;
        let resolved = resolver.resolve("u1", &snapshot).await.unwrap();
        assert_eq!(resolved, ConfigValue::Null);
    }
}
