//! Repository for [`AgentMessage`] rows.

use cp_core::{AgentMessage, ConfigValue, MessageRole};
use cp_error::{CpError, ErrorCode};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Append a message to a session's transcript.
pub async fn append(
    pool: &PgPool,
    session_id: Uuid,
    role: MessageRole,
    content: &ConfigValue,
    text_preview: Option<&str>,
) -> Result<AgentMessage, CpError> {
    let content_json: serde_json::Value = content.clone().into();
    let row = sqlx::query(
        r#"
        insert into agent_messages (session_id, role, content, text_preview)
        values ($1, $2, $3, $4)
        returning id, session_id, role, content, text_preview, created_at
        "#,
    )
    .bind(session_id)
    .bind(role.as_str())
    .bind(content_json)
    .bind(text_preview)
    .fetch_one(pool)
    .await
    .map_err(CpError::database)?;

    from_row(&row)
}

/// Append a message and, in the same transaction, merge an optional state
/// patch onto the owning session — the `message.appended` callback's shape.
pub async fn append_with_patch(
    pool: &PgPool,
    session_id: Uuid,
    role: MessageRole,
    content: &ConfigValue,
    text_preview: Option<&str>,
    state_patch: Option<&ConfigValue>,
) -> Result<AgentMessage, CpError> {
    let mut tx = pool.begin().await.map_err(CpError::database)?;

    let content_json: serde_json::Value = content.clone().into();
    let row = sqlx::query(
        r#"
        insert into agent_messages (session_id, role, content, text_preview)
        values ($1, $2, $3, $4)
        returning id, session_id, role, content, text_preview, created_at
        "#,
    )
    .bind(session_id)
    .bind(role.as_str())
    .bind(content_json)
    .bind(text_preview)
    .fetch_one(&mut *tx)
    .await
    .map_err(CpError::database)?;
    let message = from_row(&row)?;

    if let Some(patch) = state_patch {
        let patch_json: serde_json::Value = patch.clone().into();
        sqlx::query(
            "update agent_sessions set state_patch = state_patch || $1, updated_at = now() where id = $2",
        )
        .bind(patch_json)
        .bind(session_id)
        .execute(&mut *tx)
        .await
        .map_err(CpError::database)?;
    }

    tx.commit().await.map_err(CpError::database)?;
    Ok(message)
}

/// List a session's messages in insertion order.
pub async fn list_by_session(pool: &PgPool, session_id: Uuid) -> Result<Vec<AgentMessage>, CpError> {
    let rows = sqlx::query(
        r#"
        select id, session_id, role, content, text_preview, created_at
        from agent_messages
        where session_id = $1
        order by created_at, id
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await
    .map_err(CpError::database)?;

    rows.iter().map(from_row).collect()
}

/// Fetch a single message by id, scoped to the owning session.
pub async fn get(pool: &PgPool, session_id: Uuid, id: i64) -> Result<AgentMessage, CpError> {
    let row = sqlx::query(
        r#"
        select id, session_id, role, content, text_preview, created_at
        from agent_messages
        where id = $1 and session_id = $2
        "#,
    )
    .bind(id)
    .bind(session_id)
    .fetch_optional(pool)
    .await
    .map_err(CpError::database)?
    .ok_or_else(|| CpError::not_found(ErrorCode::MessageNotFound, "message not found"))?;

    from_row(&row)
}

pub(crate) fn from_row(row: &sqlx::postgres::PgRow) -> Result<AgentMessage, CpError> {
    let role: String = row.try_get("role").map_err(CpError::database)?;
    let content: serde_json::Value = row.try_get("content").map_err(CpError::database)?;

    Ok(AgentMessage {
        id: row.try_get("id").map_err(CpError::database)?,
        session_id: row.try_get("session_id").map_err(CpError::database)?,
        role: MessageRole::parse(&role)
            .ok_or_else(|| CpError::new(ErrorCode::DatabaseError, "invalid message role in row"))?,
        content: content.into(),
        text_preview: row.try_get("text_preview").map_err(CpError::database)?,
        created_at: row.try_get("created_at").map_err(CpError::database)?,
    })
}
