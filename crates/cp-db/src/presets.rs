//! Repository for the MCP/skill preset catalog and per-user overrides.
//!
//! These are raw data-access primitives; the merge logic that turns preset
//! rows plus user overrides into the `{name: config}` map the resolver
//! expects lives in the backend's internal-API layer, which is the only
//! caller that knows how overrides should be layered onto templates.

use cp_core::{ConfigValue, McpPreset, SkillPreset};
use cp_error::CpError;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;

/// Fetch the user's full environment-variable map.
pub async fn env_map(pool: &PgPool, user_id: &str) -> Result<BTreeMap<String, String>, CpError> {
    let rows = sqlx::query("select name, value from user_env_vars where user_id = $1")
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(CpError::database)?;

    let mut map = BTreeMap::new();
    for row in rows {
        let name: String = row.try_get("name").map_err(CpError::database)?;
        let value: String = row.try_get("value").map_err(CpError::database)?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Fetch MCP presets by id, in whatever order Postgres returns them.
pub async fn mcp_presets_by_ids(pool: &PgPool, ids: &[i64]) -> Result<Vec<McpPreset>, CpError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query("select id, config from mcp_presets where id = any($1)")
        .bind(ids)
        .fetch_all(pool)
        .await
        .map_err(CpError::database)?;

    rows.into_iter()
        .map(|row| {
            let id: i64 = row.try_get("id").map_err(CpError::database)?;
            let config: serde_json::Value = row.try_get("config").map_err(CpError::database)?;
            Ok(McpPreset {
                id,
                config: ConfigValue::from(config),
            })
        })
        .collect()
}

/// Fetch skill presets by id, in whatever order Postgres returns them.
pub async fn skill_presets_by_ids(pool: &PgPool, ids: &[i64]) -> Result<Vec<SkillPreset>, CpError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query("select id, entries from skill_presets where id = any($1)")
        .bind(ids)
        .fetch_all(pool)
        .await
        .map_err(CpError::database)?;

    rows.into_iter()
        .map(|row| {
            let id: i64 = row.try_get("id").map_err(CpError::database)?;
            let entries: serde_json::Value = row.try_get("entries").map_err(CpError::database)?;
            Ok(SkillPreset {
                id,
                entries: ConfigValue::from(entries),
            })
        })
        .collect()
}

/// Fetch `user_id`'s per-preset override map for the given MCP preset ids.
pub async fn user_mcp_overrides(
    pool: &PgPool,
    user_id: &str,
    preset_ids: &[i64],
) -> Result<BTreeMap<i64, ConfigValue>, CpError> {
    if preset_ids.is_empty() {
        return Ok(BTreeMap::new());
    }
    let rows = sqlx::query(
        "select preset_id, overrides from user_mcp_configs where user_id = $1 and preset_id = any($2)",
    )
    .bind(user_id)
    .bind(preset_ids)
    .fetch_all(pool)
    .await
    .map_err(CpError::database)?;

    let mut map = BTreeMap::new();
    for row in rows {
        let preset_id: i64 = row.try_get("preset_id").map_err(CpError::database)?;
        let overrides: serde_json::Value = row.try_get("overrides").map_err(CpError::database)?;
        map.insert(preset_id, ConfigValue::from(overrides));
    }
    Ok(map)
}

/// Fetch the preset ids `user_id` has installed, restricted to `candidate_ids`.
pub async fn installed_skill_ids(
    pool: &PgPool,
    user_id: &str,
    candidate_ids: &[i64],
) -> Result<Vec<i64>, CpError> {
    if candidate_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query(
        "select preset_id from user_skill_installs where user_id = $1 and preset_id = any($2)",
    )
    .bind(user_id)
    .bind(candidate_ids)
    .fetch_all(pool)
    .await
    .map_err(CpError::database)?;

    rows.into_iter()
        .map(|row| row.try_get::<i64, _>("preset_id").map_err(CpError::database))
        .collect()
}
