//! Repository for [`AgentRun`] rows — the claim/start/fail lifecycle.
//!
//! [`claim_next_run`] is the one query in this crate that matters for
//! correctness under concurrency: it uses a `WITH ... FOR UPDATE SKIP
//! LOCKED` CTE so that two workers racing to claim never observe the same
//! row, the same pattern an order-dispatch outbox uses to hand out work to
//! competing consumers.

use crate::Page;
use chrono::{DateTime, Utc};
use cp_core::{AgentMessage, AgentRun, ConfigValue, MessageRole, RunError, RunStatus};
use cp_error::{CpError, ErrorCode};
use sqlx::{PgPool, Row};
use uuid::Uuid;

const COLUMNS: &str = "id, session_id, user_message_id, status, config_snapshot, claim_token, \
    claimed_at, started_at, finished_at, error, attempt, cancel_requested, created_at, updated_at";

/// Create a queued run for `user_message_id` within `session_id`.
pub async fn create(
    pool: &PgPool,
    session_id: Uuid,
    user_message_id: i64,
    config_snapshot: &ConfigValue,
) -> Result<AgentRun, CpError> {
    let snapshot_json: serde_json::Value = config_snapshot.clone().into();
    let row = sqlx::query(&format!(
        r#"
        insert into agent_runs (session_id, user_message_id, config_snapshot)
        values ($1, $2, $3)
        returning {COLUMNS}
        "#
    ))
    .bind(session_id)
    .bind(user_message_id)
    .bind(snapshot_json)
    .fetch_one(pool)
    .await
    .map_err(CpError::database)?;

    from_row(&row)
}

/// Submit a user prompt: insert the triggering [`AgentMessage`] and a queued
/// [`AgentRun`] for it in one transaction, so a run is never observable
/// without its prompt (or vice versa).
pub async fn submit(
    pool: &PgPool,
    session_id: Uuid,
    content: &ConfigValue,
    text_preview: Option<&str>,
    config_snapshot: &ConfigValue,
) -> Result<(AgentMessage, AgentRun), CpError> {
    let mut tx = pool.begin().await.map_err(CpError::database)?;

    let content_json: serde_json::Value = content.clone().into();
    let message_row = sqlx::query(
        r#"
        insert into agent_messages (session_id, role, content, text_preview)
        values ($1, $2, $3, $4)
        returning id, session_id, role, content, text_preview, created_at
        "#,
    )
    .bind(session_id)
    .bind(MessageRole::User.as_str())
    .bind(content_json)
    .bind(text_preview)
    .fetch_one(&mut *tx)
    .await
    .map_err(CpError::database)?;
    let message = crate::messages::from_row(&message_row)?;

    let snapshot_json: serde_json::Value = config_snapshot.clone().into();
    let run_row = sqlx::query(&format!(
        r#"
        insert into agent_runs (session_id, user_message_id, config_snapshot)
        values ($1, $2, $3)
        returning {COLUMNS}
        "#
    ))
    .bind(session_id)
    .bind(message.id)
    .bind(snapshot_json)
    .fetch_one(&mut *tx)
    .await
    .map_err(CpError::database)?;
    let run = from_row(&run_row)?;

    sqlx::query("update agent_sessions set status = 'running', updated_at = now() where id = $1")
        .bind(session_id)
        .execute(&mut *tx)
        .await
        .map_err(CpError::database)?;

    tx.commit().await.map_err(CpError::database)?;
    Ok((message, run))
}

/// Fetch a run by id.
pub async fn get(pool: &PgPool, id: Uuid) -> Result<AgentRun, CpError> {
    let row = sqlx::query(&format!("select {COLUMNS} from agent_runs where id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(CpError::database)?
        .ok_or_else(|| CpError::not_found(ErrorCode::RunNotFound, "run not found"))?;

    from_row(&row)
}

/// List a session's runs, most recent first.
pub async fn list_by_session(pool: &PgPool, session_id: Uuid, page: Page) -> Result<Vec<AgentRun>, CpError> {
    let rows = sqlx::query(&format!(
        r#"
        select {COLUMNS}
        from agent_runs
        where session_id = $1
        order by created_at desc, id desc
        limit $2 offset $3
        "#
    ))
    .bind(session_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await
    .map_err(CpError::database)?;

    rows.iter().map(from_row).collect()
}

/// Atomically claim the oldest queued run for `worker_id`.
///
/// Returns `None` if no run is currently queued. `capabilities` is accepted
/// for forward compatibility with worker-requirement matching but the
/// current schema carries no per-run requirements to match against, so
/// every queued run is eligible to every worker.
pub async fn claim_next_run(
    pool: &PgPool,
    _worker_id: &str,
    _capabilities: Option<&[String]>,
) -> Result<Option<(AgentRun, String)>, CpError> {
    let claim_token = Uuid::new_v4().to_string();

    let row = sqlx::query(&format!(
        r#"
        with to_claim as (
            select id
            from agent_runs
            where status = 'queued'
            order by created_at, id
            limit 1
            for update skip locked
        )
        update agent_runs
        set status = 'claimed',
            claim_token = $1,
            claimed_at = now(),
            updated_at = now()
        where id in (select id from to_claim)
        returning {COLUMNS}
        "#
    ))
    .bind(&claim_token)
    .fetch_optional(pool)
    .await
    .map_err(CpError::database)?;

    match row {
        Some(row) => Ok(Some((from_row(&row)?, claim_token))),
        None => Ok(None),
    }
}

/// Transition `claimed -> running`. Idempotent if already `running` with a
/// matching token; `CONFLICT` if the token doesn't match the current holder
/// or the run is in neither `claimed` nor `running`.
pub async fn start_run(
    pool: &PgPool,
    id: Uuid,
    claim_token: &str,
    sdk_session_id: Option<&str>,
) -> Result<AgentRun, CpError> {
    let current = get(pool, id).await?;
    if current.claim_token.as_deref() != Some(claim_token) {
        return Err(CpError::new(ErrorCode::StaleClaim, "claim token does not match run's current holder")
            .with_context("run_id", id.to_string()));
    }
    if current.status == RunStatus::Running {
        return Ok(current);
    }
    if current.status != RunStatus::Claimed {
        return Err(CpError::new(
            ErrorCode::InvalidTransition,
            format!("cannot start a run in status {}", current.status.as_str()),
        ));
    }

    let row = sqlx::query(&format!(
        r#"
        update agent_runs
        set status = 'running', started_at = now(), updated_at = now()
        where id = $1 and claim_token = $2
        returning {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(claim_token)
    .fetch_optional(pool)
    .await
    .map_err(CpError::database)?
    .ok_or_else(|| CpError::new(ErrorCode::StaleClaim, "claim token no longer matches"))?;

    if let Some(sdk_id) = sdk_session_id {
        crate::sessions::apply_state_patch(pool, current.session_id, Some(sdk_id), &ConfigValue::empty_map())
            .await?;
    }

    from_row(&row)
}

/// Transition `claimed|running -> failed`, persisting a structured error.
pub async fn fail_run(
    pool: &PgPool,
    id: Uuid,
    claim_token: &str,
    error: RunError,
) -> Result<AgentRun, CpError> {
    let current = get(pool, id).await?;
    if current.status.is_terminal() {
        return Err(CpError::new(
            ErrorCode::InvalidTransition,
            format!("run {} is already in a terminal state", current.status.as_str()),
        ));
    }
    if current.claim_token.as_deref() != Some(claim_token) {
        return Err(CpError::new(ErrorCode::StaleClaim, "claim token does not match run's current holder")
            .with_context("run_id", id.to_string()));
    }

    let error_json = serde_json::to_value(&error).map_err(|e| {
        CpError::new(ErrorCode::Internal, "failed to serialize run error").with_source(e)
    })?;

    let row = sqlx::query(&format!(
        r#"
        update agent_runs
        set status = 'failed', finished_at = now(), error = $1, updated_at = now()
        where id = $2 and claim_token = $3
        returning {COLUMNS}
        "#
    ))
    .bind(error_json)
    .bind(id)
    .bind(claim_token)
    .fetch_optional(pool)
    .await
    .map_err(CpError::database)?
    .ok_or_else(|| CpError::new(ErrorCode::StaleClaim, "claim token no longer matches"))?;

    crate::sessions::set_status(pool, current.session_id, cp_core::SessionStatus::Failed).await?;

    from_row(&row)
}

/// Transition `running -> succeeded`.
pub async fn succeed_run(pool: &PgPool, id: Uuid, claim_token: &str) -> Result<AgentRun, CpError> {
    succeed_run_with_export(pool, id, claim_token, None, None, None).await
}

/// Transition `running -> succeeded`, optionally materializing the
/// session's workspace export keys from the same `run.succeeded` callback
/// payload. Run transition, session status, and export fields commit in one
/// transaction so a reader never observes `succeeded` without the export
/// state the callback carried.
pub async fn succeed_run_with_export(
    pool: &PgPool,
    id: Uuid,
    claim_token: &str,
    workspace_prefix: Option<&str>,
    workspace_manifest_key: Option<&str>,
    workspace_archive_key: Option<&str>,
) -> Result<AgentRun, CpError> {
    let current = get(pool, id).await?;
    if current.status.is_terminal() {
        return Err(CpError::new(
            ErrorCode::InvalidTransition,
            format!("run {} is already in a terminal state", current.status.as_str()),
        ));
    }
    if current.claim_token.as_deref() != Some(claim_token) {
        return Err(CpError::new(ErrorCode::StaleClaim, "claim token does not match run's current holder")
            .with_context("run_id", id.to_string()));
    }

    let mut tx = pool.begin().await.map_err(CpError::database)?;

    let row = sqlx::query(&format!(
        r#"
        update agent_runs
        set status = 'succeeded', finished_at = now(), updated_at = now()
        where id = $1 and claim_token = $2
        returning {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(claim_token)
    .fetch_optional(&mut *tx)
    .await
    .map_err(CpError::database)?
    .ok_or_else(|| CpError::new(ErrorCode::StaleClaim, "claim token no longer matches"))?;

    sqlx::query("update agent_sessions set status = 'completed', updated_at = now() where id = $1")
        .bind(current.session_id)
        .execute(&mut *tx)
        .await
        .map_err(CpError::database)?;

    if workspace_prefix.is_some() || workspace_manifest_key.is_some() || workspace_archive_key.is_some() {
        sqlx::query(
            r#"
            update agent_sessions
            set workspace_prefix = coalesce($1, workspace_prefix),
                workspace_manifest_key = coalesce($2, workspace_manifest_key),
                workspace_archive_key = coalesce($3, workspace_archive_key),
                workspace_export_status = 'ready',
                updated_at = now()
            where id = $4
            "#,
        )
        .bind(workspace_prefix)
        .bind(workspace_manifest_key)
        .bind(workspace_archive_key)
        .bind(current.session_id)
        .execute(&mut *tx)
        .await
        .map_err(CpError::database)?;
    }

    tx.commit().await.map_err(CpError::database)?;
    from_row(&row)
}

/// Release runs claimed longer than `claim_ttl` ago that never started,
/// resetting them to `queued` and incrementing `attempt`. Returns the
/// number of runs released. Intended to be called on a timer by an
/// orphan-reaper background task.
pub async fn release_orphaned_claims(
    pool: &PgPool,
    claim_ttl: chrono::Duration,
) -> Result<u64, CpError> {
    let cutoff: DateTime<Utc> = Utc::now() - claim_ttl;
    let result = sqlx::query(
        r#"
        update agent_runs
        set status = 'queued',
            claim_token = null,
            claimed_at = null,
            attempt = attempt + 1,
            updated_at = now()
        where status = 'claimed'
          and started_at is null
          and claimed_at < $1
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await
    .map_err(CpError::database)?;

    Ok(result.rows_affected())
}

fn from_row(row: &sqlx::postgres::PgRow) -> Result<AgentRun, CpError> {
    let status: String = row.try_get("status").map_err(CpError::database)?;
    let config_snapshot: serde_json::Value =
        row.try_get("config_snapshot").map_err(CpError::database)?;
    let error: Option<serde_json::Value> = row.try_get("error").map_err(CpError::database)?;

    Ok(AgentRun {
        id: row.try_get("id").map_err(CpError::database)?,
        session_id: row.try_get("session_id").map_err(CpError::database)?,
        user_message_id: row.try_get("user_message_id").map_err(CpError::database)?,
        status: RunStatus::parse(&status)
            .ok_or_else(|| CpError::new(ErrorCode::DatabaseError, "invalid run status in row"))?,
        config_snapshot: config_snapshot.into(),
        claim_token: row.try_get("claim_token").map_err(CpError::database)?,
        claimed_at: row.try_get("claimed_at").map_err(CpError::database)?,
        started_at: row.try_get("started_at").map_err(CpError::database)?,
        finished_at: row.try_get("finished_at").map_err(CpError::database)?,
        error: error
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| CpError::new(ErrorCode::DatabaseError, "invalid run error in row").with_source(e))?,
        attempt: row.try_get("attempt").map_err(CpError::database)?,
        cancel_requested: row.try_get("cancel_requested").map_err(CpError::database)?,
        created_at: row.try_get("created_at").map_err(CpError::database)?,
        updated_at: row.try_get("updated_at").map_err(CpError::database)?,
    })
}
