//! Repository for [`ToolExecution`] rows.

use chrono::{DateTime, Utc};
use cp_core::{ConfigValue, ToolExecution, ToolExecutionStatus};
use cp_error::{CpError, ErrorCode};
use sqlx::{PgPool, Row};
use uuid::Uuid;

const COLUMNS: &str =
    "id, session_id, run_id, tool_name, input, output, error, started_at, finished_at, status";

/// Record a `tool.started` callback.
///
/// Upserts by `id` — the executor assigns it, so a retried callback (same
/// id) replaces rather than duplicates the row.
pub async fn start(
    pool: &PgPool,
    id: Uuid,
    session_id: Uuid,
    run_id: Uuid,
    tool_name: &str,
    input: &ConfigValue,
    started_at: DateTime<Utc>,
) -> Result<ToolExecution, CpError> {
    let input_json: serde_json::Value = input.clone().into();
    let row = sqlx::query(&format!(
        r#"
        insert into tool_executions (id, session_id, run_id, tool_name, input, started_at)
        values ($1, $2, $3, $4, $5, $6)
        on conflict (id) do update
        set session_id = excluded.session_id,
            run_id = excluded.run_id,
            tool_name = excluded.tool_name,
            input = excluded.input,
            started_at = excluded.started_at,
            status = 'started'
        returning {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(session_id)
    .bind(run_id)
    .bind(tool_name)
    .bind(input_json)
    .bind(started_at)
    .fetch_one(pool)
    .await
    .map_err(CpError::database)?;

    from_row(&row)
}

/// Record a `tool.finished` callback.
///
/// Rejects out-of-order completion: `finished_at` must not precede the
/// recorded `started_at`.
pub async fn finish(
    pool: &PgPool,
    id: Uuid,
    output: Option<&ConfigValue>,
    error: Option<&ConfigValue>,
    finished_at: DateTime<Utc>,
) -> Result<ToolExecution, CpError> {
    let current = get(pool, id).await?;
    if finished_at < current.started_at {
        return Err(CpError::new(
            ErrorCode::BadRequest,
            "finished_at precedes started_at",
        )
        .with_context("tool_execution_id", id.to_string()));
    }

    let output_json = output.cloned().map(serde_json::Value::from);
    let error_json = error.cloned().map(serde_json::Value::from);

    let row = sqlx::query(&format!(
        r#"
        update tool_executions
        set output = $1, error = $2, finished_at = $3, status = 'finished'
        where id = $4
        returning {COLUMNS}
        "#
    ))
    .bind(output_json)
    .bind(error_json)
    .bind(finished_at)
    .bind(id)
    .fetch_one(pool)
    .await
    .map_err(CpError::database)?;

    from_row(&row)
}

/// Fetch a tool execution by id.
pub async fn get(pool: &PgPool, id: Uuid) -> Result<ToolExecution, CpError> {
    let row = sqlx::query(&format!("select {COLUMNS} from tool_executions where id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(CpError::database)?
        .ok_or_else(|| CpError::not_found(ErrorCode::ToolExecutionNotFound, "tool execution not found"))?;

    from_row(&row)
}

/// List a session's tool executions, most recent first.
pub async fn list_by_session(pool: &PgPool, session_id: Uuid) -> Result<Vec<ToolExecution>, CpError> {
    let rows = sqlx::query(&format!(
        r#"
        select {COLUMNS}
        from tool_executions
        where session_id = $1
        order by started_at desc, id desc
        "#
    ))
    .bind(session_id)
    .fetch_all(pool)
    .await
    .map_err(CpError::database)?;

    rows.iter().map(from_row).collect()
}

/// List a run's tool executions in the order they started.
pub async fn list_by_run(pool: &PgPool, run_id: Uuid) -> Result<Vec<ToolExecution>, CpError> {
    let rows = sqlx::query(&format!(
        r#"
        select {COLUMNS}
        from tool_executions
        where run_id = $1
        order by started_at, id
        "#
    ))
    .bind(run_id)
    .fetch_all(pool)
    .await
    .map_err(CpError::database)?;

    rows.iter().map(from_row).collect()
}

fn from_row(row: &sqlx::postgres::PgRow) -> Result<ToolExecution, CpError> {
    let status: String = row.try_get("status").map_err(CpError::database)?;
    let input: serde_json::Value = row.try_get("input").map_err(CpError::database)?;
    let output: Option<serde_json::Value> = row.try_get("output").map_err(CpError::database)?;
    let error: Option<serde_json::Value> = row.try_get("error").map_err(CpError::database)?;

    Ok(ToolExecution {
        id: row.try_get("id").map_err(CpError::database)?,
        session_id: row.try_get("session_id").map_err(CpError::database)?,
        run_id: row.try_get("run_id").map_err(CpError::database)?,
        tool_name: row.try_get("tool_name").map_err(CpError::database)?,
        input: input.into(),
        output: output.map(ConfigValue::from),
        error: error.map(ConfigValue::from),
        started_at: row.try_get("started_at").map_err(CpError::database)?,
        finished_at: row.try_get("finished_at").map_err(CpError::database)?,
        status: ToolExecutionStatus::parse(&status)
            .ok_or_else(|| CpError::new(ErrorCode::DatabaseError, "invalid tool execution status in row"))?,
    })
}
