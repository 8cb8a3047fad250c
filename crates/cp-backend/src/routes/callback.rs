//! Executor callback sink — the single ingress executors post progress to.
//!
//! One endpoint, six fixed `kind`s (see `SPEC_FULL.md` §4.4 in spirit, not by
//! name): the set is closed, not extensible, so dispatch is a plain `match`
//! rather than a registry. Each kind's mutation commits atomically in
//! `cp-db` — an unknown `kind` is `BAD_REQUEST`; a referenced run or session
//! that doesn't exist is `NOT_FOUND`.

use crate::envelope::Envelope;
use crate::AppState;
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use cp_core::{ConfigValue, MessageRole, RunError};
use cp_error::{CpError, ErrorCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct MessageAppended {
    session_id: Uuid,
    role: MessageRole,
    content: Value,
    #[serde(default)]
    text_preview: Option<String>,
    #[serde(default)]
    state_patch: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ToolStarted {
    id: Uuid,
    session_id: Uuid,
    run_id: Uuid,
    tool_name: String,
    input: Value,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ToolFinished {
    id: Uuid,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    finished_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct UsageRecorded {
    run_id: Uuid,
    #[serde(default)]
    tool_execution_id: Option<Uuid>,
    input_tokens: i64,
    output_tokens: i64,
    cost_usd: f64,
}

#[derive(Debug, Deserialize)]
struct RunSucceeded {
    run_id: Uuid,
    claim_token: String,
    #[serde(default)]
    workspace_prefix: Option<String>,
    #[serde(default)]
    workspace_manifest_key: Option<String>,
    #[serde(default)]
    workspace_archive_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunFailed {
    run_id: Uuid,
    claim_token: String,
    error: RunError,
}

#[derive(Debug, Deserialize)]
struct SessionState {
    session_id: Uuid,
    #[serde(default)]
    sdk_session_id: Option<String>,
    #[serde(default)]
    state_patch: Option<Value>,
    #[serde(default)]
    workspace_prefix: Option<String>,
    #[serde(default)]
    workspace_manifest_key: Option<String>,
    #[serde(default)]
    workspace_archive_key: Option<String>,
}

fn payload<T: for<'de> Deserialize<'de>>(body: &Value) -> Result<T, CpError> {
    serde_json::from_value(body.clone())
        .map_err(|e| CpError::new(ErrorCode::BadRequest, format!("malformed callback payload: {e}")))
}

/// `POST /callback` — the executor's only write path into the backend.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Envelope<Value>, CpError> {
    let kind = body
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| CpError::new(ErrorCode::BadRequest, "callback missing \"kind\""))?;

    match kind {
        "message.appended" => {
            let p: MessageAppended = payload(&body)?;
            cp_db::sessions::get_any(&state.pool, p.session_id).await?;
            let content: ConfigValue = p.content.into();
            let patch: Option<ConfigValue> = p.state_patch.map(ConfigValue::from);
            let message = cp_db::messages::append_with_patch(
                &state.pool,
                p.session_id,
                p.role,
                &content,
                p.text_preview.as_deref(),
                patch.as_ref(),
            )
            .await?;
            Ok(Envelope::ok(serde_json::to_value(message).unwrap()))
        }
        "tool.started" => {
            let p: ToolStarted = payload(&body)?;
            cp_db::sessions::get_any(&state.pool, p.session_id).await?;
            cp_db::runs::get(&state.pool, p.run_id).await?;
            let input: ConfigValue = p.input.into();
            let exec = cp_db::tool_executions::start(
                &state.pool,
                p.id,
                p.session_id,
                p.run_id,
                &p.tool_name,
                &input,
                p.started_at,
            )
            .await?;
            Ok(Envelope::ok(serde_json::to_value(exec).unwrap()))
        }
        "tool.finished" => {
            let p: ToolFinished = payload(&body)?;
            let output: Option<ConfigValue> = p.output.map(ConfigValue::from);
            let error: Option<ConfigValue> = p.error.map(ConfigValue::from);
            let exec = cp_db::tool_executions::finish(
                &state.pool,
                p.id,
                output.as_ref(),
                error.as_ref(),
                p.finished_at,
            )
            .await?;
            Ok(Envelope::ok(serde_json::to_value(exec).unwrap()))
        }
        "usage.recorded" => {
            let p: UsageRecorded = payload(&body)?;
            cp_db::runs::get(&state.pool, p.run_id).await?;
            let usage = cp_db::usage::record(
                &state.pool,
                p.run_id,
                p.tool_execution_id,
                p.input_tokens,
                p.output_tokens,
                p.cost_usd,
            )
            .await?;
            Ok(Envelope::ok(serde_json::to_value(usage).unwrap()))
        }
        "run.succeeded" => {
            let p: RunSucceeded = payload(&body)?;
            let run = cp_db::runs::succeed_run_with_export(
                &state.pool,
                p.run_id,
                &p.claim_token,
                p.workspace_prefix.as_deref(),
                p.workspace_manifest_key.as_deref(),
                p.workspace_archive_key.as_deref(),
            )
            .await?;
            Ok(Envelope::ok(serde_json::to_value(run).unwrap()))
        }
        "run.failed" => {
            let p: RunFailed = payload(&body)?;
            let run = cp_db::runs::fail_run(&state.pool, p.run_id, &p.claim_token, p.error).await?;
            Ok(Envelope::ok(serde_json::to_value(run).unwrap()))
        }
        "session.state" => {
            let p: SessionState = payload(&body)?;
            cp_db::sessions::get_any(&state.pool, p.session_id).await?;
            let patch: ConfigValue = p.state_patch.map(ConfigValue::from).unwrap_or(ConfigValue::empty_map());
            cp_db::sessions::apply_session_state_callback(
                &state.pool,
                p.session_id,
                p.sdk_session_id.as_deref(),
                &patch,
                p.workspace_prefix.as_deref(),
                p.workspace_manifest_key.as_deref(),
                p.workspace_archive_key.as_deref(),
            )
            .await?;
            let session = cp_db::sessions::get_any(&state.pool, p.session_id).await?;
            Ok(Envelope::ok(serde_json::to_value(session).unwrap()))
        }
        other => Err(CpError::new(
            ErrorCode::BadRequest,
            format!("unknown callback kind \"{other}\""),
        )),
    }
}
