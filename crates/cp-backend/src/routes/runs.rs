//! Run claim/lifecycle endpoints, consumed by the executor manager.

use crate::envelope::Envelope;
use crate::{AppState, UserId};
use axum::extract::{Path, State};
use axum::Json;
use cp_core::{AgentRun, RunError};
use cp_db::Page;
use cp_error::CpError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub worker_id: String,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub run: AgentRun,
    pub claim_token: String,
}

pub async fn claim(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClaimRequest>,
) -> Result<Envelope<Option<ClaimResponse>>, CpError> {
    let claimed = cp_db::runs::claim_next_run(
        &state.pool,
        &req.worker_id,
        req.capabilities.as_deref(),
    )
    .await?;
    Ok(Envelope::ok(
        claimed.map(|(run, claim_token)| ClaimResponse { run, claim_token }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub claim_token: String,
    #[serde(default)]
    pub sdk_session_id: Option<String>,
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<StartRequest>,
) -> Result<Envelope<AgentRun>, CpError> {
    let run = cp_db::runs::start_run(&state.pool, id, &req.claim_token, req.sdk_session_id.as_deref())
        .await?;
    Ok(Envelope::ok(run))
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    pub claim_token: String,
    pub error: RunError,
}

pub async fn fail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<FailRequest>,
) -> Result<Envelope<AgentRun>, CpError> {
    let run = cp_db::runs::fail_run(&state.pool, id, &req.claim_token, req.error).await?;
    Ok(Envelope::ok(run))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    user: UserId,
    Path(id): Path<Uuid>,
) -> Result<Envelope<AgentRun>, CpError> {
    let run = cp_db::runs::get(&state.pool, id).await?;
    cp_db::sessions::get(&state.pool, &user.0, run.session_id).await?;
    Ok(Envelope::ok(run))
}

pub async fn list_by_session(
    State(state): State<Arc<AppState>>,
    user: UserId,
    Path(session_id): Path<Uuid>,
) -> Result<Envelope<Vec<AgentRun>>, CpError> {
    cp_db::sessions::get(&state.pool, &user.0, session_id).await?;
    let runs = cp_db::runs::list_by_session(&state.pool, session_id, Page::default()).await?;
    Ok(Envelope::ok(runs))
}
