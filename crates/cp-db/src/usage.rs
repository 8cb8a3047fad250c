//! Repository for [`UsageLog`] rows.

use cp_core::UsageLog;
use cp_error::CpError;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Record a `usage.recorded` callback.
pub async fn record(
    pool: &PgPool,
    run_id: Uuid,
    tool_execution_id: Option<Uuid>,
    input_tokens: i64,
    output_tokens: i64,
    cost_usd: f64,
) -> Result<UsageLog, CpError> {
    let row = sqlx::query(
        r#"
        insert into usage_logs (run_id, tool_execution_id, input_tokens, output_tokens, cost_usd)
        values ($1, $2, $3, $4, $5)
        returning id, run_id, tool_execution_id, input_tokens, output_tokens, cost_usd, recorded_at
        "#,
    )
    .bind(run_id)
    .bind(tool_execution_id)
    .bind(input_tokens)
    .bind(output_tokens)
    .bind(cost_usd)
    .fetch_one(pool)
    .await
    .map_err(CpError::database)?;

    from_row(&row)
}

/// List usage entries for a run, in recording order.
pub async fn list_by_run(pool: &PgPool, run_id: Uuid) -> Result<Vec<UsageLog>, CpError> {
    let rows = sqlx::query(
        r#"
        select id, run_id, tool_execution_id, input_tokens, output_tokens, cost_usd, recorded_at
        from usage_logs
        where run_id = $1
        order by recorded_at, id
        "#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .map_err(CpError::database)?;

    rows.iter().map(from_row).collect()
}

/// List usage entries for every run in a session, in recording order.
pub async fn list_by_session(pool: &PgPool, session_id: Uuid) -> Result<Vec<UsageLog>, CpError> {
    let rows = sqlx::query(
        r#"
        select u.id, u.run_id, u.tool_execution_id, u.input_tokens, u.output_tokens,
               u.cost_usd, u.recorded_at
        from usage_logs u
        join agent_runs r on r.id = u.run_id
        where r.session_id = $1
        order by u.recorded_at, u.id
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await
    .map_err(CpError::database)?;

    rows.iter().map(from_row).collect()
}

fn from_row(row: &sqlx::postgres::PgRow) -> Result<UsageLog, CpError> {
    Ok(UsageLog {
        id: row.try_get("id").map_err(CpError::database)?,
        run_id: row.try_get("run_id").map_err(CpError::database)?,
        tool_execution_id: row.try_get("tool_execution_id").map_err(CpError::database)?,
        input_tokens: row.try_get("input_tokens").map_err(CpError::database)?,
        output_tokens: row.try_get("output_tokens").map_err(CpError::database)?,
        cost_usd: row.try_get("cost_usd").map_err(CpError::database)?,
        recorded_at: row.try_get("recorded_at").map_err(CpError::database)?,
    })
}
