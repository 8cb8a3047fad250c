//! Repository for [`AgentSession`] rows.

use crate::Page;
use cp_core::{AgentSession, ConfigValue, SessionStatus, WorkspaceExportStatus};
use cp_error::{CpError, ErrorCode};
use sqlx::{PgPool, Row};
use uuid::Uuid;

const COLUMNS: &str = "id, user_id, project_id, sdk_session_id, status, config_snapshot, \
    state_patch, workspace_prefix, workspace_manifest_key, workspace_archive_key, \
    workspace_export_status, is_deleted, created_at, updated_at";

/// Create a session with the given config snapshot.
pub async fn create(
    pool: &PgPool,
    user_id: &str,
    project_id: Option<Uuid>,
    config_snapshot: &ConfigValue,
) -> Result<AgentSession, CpError> {
    let snapshot_json: serde_json::Value = config_snapshot.clone().into();
    let row = sqlx::query(&format!(
        r#"
        insert into agent_sessions (user_id, project_id, config_snapshot)
        values ($1, $2, $3)
        returning {COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(project_id)
    .bind(snapshot_json)
    .fetch_one(pool)
    .await
    .map_err(CpError::database)?;

    from_row(&row)
}

/// Fetch a session by id, scoped to `user_id`.
pub async fn get(pool: &PgPool, user_id: &str, id: Uuid) -> Result<AgentSession, CpError> {
    let row = sqlx::query(&format!(
        r#"
        select {COLUMNS}
        from agent_sessions
        where id = $1 and user_id = $2 and not is_deleted
        "#
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(CpError::database)?
    .ok_or_else(|| CpError::not_found(ErrorCode::SessionNotFound, "session not found"))?;

    from_row(&row)
}

/// Fetch a session by id regardless of owner, for internal (manager-facing) reads.
pub async fn get_any(pool: &PgPool, id: Uuid) -> Result<AgentSession, CpError> {
    let row = sqlx::query(&format!(
        r#"
        select {COLUMNS}
        from agent_sessions
        where id = $1 and not is_deleted
        "#
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(CpError::database)?
    .ok_or_else(|| CpError::not_found(ErrorCode::SessionNotFound, "session not found"))?;

    from_row(&row)
}

/// List `user_id`'s sessions, most recent first.
pub async fn list(pool: &PgPool, user_id: &str, page: Page) -> Result<Vec<AgentSession>, CpError> {
    let rows = sqlx::query(&format!(
        r#"
        select {COLUMNS}
        from agent_sessions
        where user_id = $1 and not is_deleted
        order by created_at desc, id desc
        limit $2 offset $3
        "#
    ))
    .bind(user_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await
    .map_err(CpError::database)?;

    rows.iter().map(from_row).collect()
}

/// Update a session's lifecycle status.
pub async fn set_status(pool: &PgPool, id: Uuid, status: SessionStatus) -> Result<(), CpError> {
    sqlx::query(
        r#"
        update agent_sessions
        set status = $1, updated_at = now()
        where id = $2
        "#,
    )
    .bind(status.as_str())
    .bind(id)
    .execute(pool)
    .await
    .map_err(CpError::database)?;
    Ok(())
}

/// Apply a `session.state` callback: patch `state_patch` and, the first time
/// only, set `sdk_session_id`. A second callback with the same
/// `sdk_session_id` is a no-op rather than an error.
pub async fn apply_state_patch(
    pool: &PgPool,
    id: Uuid,
    sdk_session_id: Option<&str>,
    patch: &ConfigValue,
) -> Result<(), CpError> {
    let patch_json: serde_json::Value = patch.clone().into();
    sqlx::query(
        r#"
        update agent_sessions
        set state_patch = state_patch || $1,
            sdk_session_id = coalesce(sdk_session_id, $2),
            updated_at = now()
        where id = $3
        "#,
    )
    .bind(patch_json)
    .bind(sdk_session_id)
    .bind(id)
    .execute(pool)
    .await
    .map_err(CpError::database)?;
    Ok(())
}

/// Apply a `session.state` callback in full: state patch, `sdk_session_id`
/// (first time only), and any workspace fields the payload carried, all in
/// one statement so the row never shows a partial update.
pub async fn apply_session_state_callback(
    pool: &PgPool,
    id: Uuid,
    sdk_session_id: Option<&str>,
    patch: &ConfigValue,
    workspace_prefix: Option<&str>,
    workspace_manifest_key: Option<&str>,
    workspace_archive_key: Option<&str>,
) -> Result<(), CpError> {
    let patch_json: serde_json::Value = patch.clone().into();
    sqlx::query(
        r#"
        update agent_sessions
        set state_patch = state_patch || $1,
            sdk_session_id = coalesce(sdk_session_id, $2),
            workspace_prefix = coalesce($3, workspace_prefix),
            workspace_manifest_key = coalesce($4, workspace_manifest_key),
            workspace_archive_key = coalesce($5, workspace_archive_key),
            updated_at = now()
        where id = $6
        "#,
    )
    .bind(patch_json)
    .bind(sdk_session_id)
    .bind(workspace_prefix)
    .bind(workspace_manifest_key)
    .bind(workspace_archive_key)
    .bind(id)
    .execute(pool)
    .await
    .map_err(CpError::database)?;
    Ok(())
}

/// Record the workspace export produced for a session.
pub async fn set_workspace_export(
    pool: &PgPool,
    id: Uuid,
    prefix: Option<&str>,
    manifest_key: Option<&str>,
    archive_key: Option<&str>,
    status: WorkspaceExportStatus,
) -> Result<(), CpError> {
    sqlx::query(
        r#"
        update agent_sessions
        set workspace_prefix = coalesce($1, workspace_prefix),
            workspace_manifest_key = coalesce($2, workspace_manifest_key),
            workspace_archive_key = coalesce($3, workspace_archive_key),
            workspace_export_status = $4,
            updated_at = now()
        where id = $5
        "#,
    )
    .bind(prefix)
    .bind(manifest_key)
    .bind(archive_key)
    .bind(status.as_str())
    .bind(id)
    .execute(pool)
    .await
    .map_err(CpError::database)?;
    Ok(())
}

/// Soft-delete a session.
pub async fn soft_delete(pool: &PgPool, user_id: &str, id: Uuid) -> Result<(), CpError> {
    let result = sqlx::query(
        r#"
        update agent_sessions
        set is_deleted = true, updated_at = now()
        where id = $1 and user_id = $2 and not is_deleted
        "#,
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(CpError::database)?;

    if result.rows_affected() == 0 {
        return Err(CpError::not_found(ErrorCode::SessionNotFound, "session not found"));
    }
    Ok(())
}

fn from_row(row: &sqlx::postgres::PgRow) -> Result<AgentSession, CpError> {
    let status: String = row.try_get("status").map_err(CpError::database)?;
    let workspace_export_status: String =
        row.try_get("workspace_export_status").map_err(CpError::database)?;
    let config_snapshot: serde_json::Value =
        row.try_get("config_snapshot").map_err(CpError::database)?;
    let state_patch: serde_json::Value = row.try_get("state_patch").map_err(CpError::database)?;

    Ok(AgentSession {
        id: row.try_get("id").map_err(CpError::database)?,
        user_id: row.try_get("user_id").map_err(CpError::database)?,
        project_id: row.try_get("project_id").map_err(CpError::database)?,
        sdk_session_id: row.try_get("sdk_session_id").map_err(CpError::database)?,
        status: SessionStatus::parse(&status)
            .ok_or_else(|| CpError::new(ErrorCode::DatabaseError, "invalid session status in row"))?,
        config_snapshot: config_snapshot.into(),
        state_patch: state_patch.into(),
        workspace_prefix: row.try_get("workspace_prefix").map_err(CpError::database)?,
        workspace_manifest_key: row
            .try_get("workspace_manifest_key")
            .map_err(CpError::database)?,
        workspace_archive_key: row
            .try_get("workspace_archive_key")
            .map_err(CpError::database)?,
        workspace_export_status: WorkspaceExportStatus::parse(&workspace_export_status)
            .ok_or_else(|| CpError::new(ErrorCode::DatabaseError, "invalid export status in row"))?,
        is_deleted: row.try_get("is_deleted").map_err(CpError::database)?,
        created_at: row.try_get("created_at").map_err(CpError::database)?,
        updated_at: row.try_get("updated_at").map_err(CpError::database)?,
    })
}
