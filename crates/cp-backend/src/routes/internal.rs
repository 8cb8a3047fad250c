//! Internal endpoints backing the executor manager's HTTP-client
//! [`cp_resolver::SideReads`] implementation.
//!
//! Not part of the externally documented API: `cp-manager` is the only
//! caller. The preset/override merge logic lives here, not in `cp-db`,
//! because it's the one layer that knows how a user's override should be
//! layered onto a preset template (see `cp-db::presets`'s own doc comment).

use crate::envelope::Envelope;
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use cp_core::ConfigValue;
use cp_error::CpError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub async fn env_map(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Envelope<BTreeMap<String, String>>, CpError> {
    let map = cp_db::presets::env_map(&state.pool, &user_id).await?;
    Ok(Envelope::ok(map))
}

/// Unscoped session read for the manager, which has no end-user identity to
/// check ownership against — it only ever sees sessions via a claimed run.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<uuid::Uuid>,
) -> Result<Envelope<cp_core::AgentSession>, CpError> {
    let session = cp_db::sessions::get_any(&state.pool, id).await?;
    Ok(Envelope::ok(session))
}

#[derive(Debug, Deserialize)]
pub struct IdsRequest {
    pub ids: Vec<i64>,
}

/// Expand MCP preset ids into a `{"server-{id}": config}` map, overlaying
/// each user's per-preset override on top of the template.
pub async fn mcp_config(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<IdsRequest>,
) -> Result<Envelope<ConfigValue>, CpError> {
    let presets = cp_db::presets::mcp_presets_by_ids(&state.pool, &req.ids).await?;
    let overrides = cp_db::presets::user_mcp_overrides(&state.pool, &user_id, &req.ids).await?;

    let mut merged = BTreeMap::new();
    for preset in presets {
        let config = match overrides.get(&preset.id) {
            Some(over) => merge_shallow(preset.config, over.clone()),
            None => preset.config,
        };
        merged.insert(format!("server-{}", preset.id), config);
    }
    Ok(Envelope::ok(ConfigValue::Map(merged)))
}

/// Expand installed skill preset ids into a `{"skill-{id}": entries}` map.
/// Ids the user hasn't installed are silently dropped.
pub async fn skill_config(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<IdsRequest>,
) -> Result<Envelope<ConfigValue>, CpError> {
    let installed = cp_db::presets::installed_skill_ids(&state.pool, &user_id, &req.ids).await?;
    let presets = cp_db::presets::skill_presets_by_ids(&state.pool, &installed).await?;

    let mut merged = BTreeMap::new();
    for preset in presets {
        merged.insert(format!("skill-{}", preset.id), preset.entries);
    }
    Ok(Envelope::ok(ConfigValue::Map(merged)))
}

/// Shallow-merge `overrides` onto `base`: matching keys replace, the rest
/// of `base` survives untouched.
fn merge_shallow(base: ConfigValue, overrides: ConfigValue) -> ConfigValue {
    match (base, overrides) {
        (ConfigValue::Map(mut base_map), ConfigValue::Map(over_map)) => {
            for (k, v) in over_map {
                base_map.insert(k, v);
            }
            ConfigValue::Map(base_map)
        }
        (_, over) => over,
    }
}

#[cfg(test)]
mod tests {
    use super::merge_shallow;
    use cp_core::ConfigValue;

    #[test]
    fn override_replaces_matching_key_and_keeps_the_rest() {
        let base: ConfigValue = serde_json::json!({"cmd": "x", "token": "placeholder"}).into();
        let over: ConfigValue = serde_json::json!({"token": "real"}).into();
        let merged = merge_shallow(base, over);
        let back: serde_json::Value = merged.into();
        assert_eq!(back, serde_json::json!({"cmd": "x", "token": "real"}));
    }
}
