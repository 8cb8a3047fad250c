//! Dispatch loop: claim a run, resolve its config, stage its inputs, hand
//! it to the executor. Workers run from a bounded `JoinSet`; an empty or
//! failed claim backs off with jittered sleep before the next attempt.

use crate::side_reads::HttpSideReads;
use crate::ManagerState;
use cp_core::{AgentRun, ConfigValue, InputFile, RunError};
use cp_error::{CpError, ErrorCode};
use cp_executor::{ExecutorTask, NoopExecutor};
use cp_resolver::Resolver;
use cp_stager::stage_inputs;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct ResponseEnvelope<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct ClaimRequest<'a> {
    worker_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClaimResponse {
    run: AgentRun,
    claim_token: String,
}

fn http_err(e: reqwest::Error) -> CpError {
    CpError::new(ErrorCode::Internal, format!("backend request failed: {e}"))
}

/// Spawn `worker_concurrency` dispatch workers into a bounded [`JoinSet`]
/// and run them until the process is killed.
pub async fn run_dispatch_pool(state: Arc<ManagerState>) {
    let mut workers = JoinSet::new();
    for n in 0..state.config.worker_concurrency {
        let state = state.clone();
        let worker_id = format!("worker-{n}");
        workers.spawn(async move { worker_loop(state, worker_id).await });
    }
    while workers.join_next().await.is_some() {}
}

async fn worker_loop(state: Arc<ManagerState>, worker_id: String) {
    loop {
        match dispatch_once(&state, &worker_id).await {
            Ok(true) => continue,
            Ok(false) => tokio::time::sleep(jittered_backoff(state.config.claim_poll_interval_ms)).await,
            Err(e) => {
                tracing::warn!(worker = %worker_id, error = %e, "claim attempt failed");
                tokio::time::sleep(jittered_backoff(state.config.claim_poll_interval_ms)).await;
            }
        }
    }
}

/// Base ± up to 50% jitter, so a pool of workers doesn't retry in lockstep.
fn jittered_backoff(base_ms: u64) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=base_ms / 2);
    Duration::from_millis(base_ms / 2 + jitter)
}

/// Claim and fully process one run.
///
/// Returns `Ok(true)` if a run was claimed (whether or not it then
/// succeeded — failures are reported back to the backend, not propagated),
/// `Ok(false)` if the queue was empty.
pub async fn dispatch_once(state: &ManagerState, worker_id: &str) -> Result<bool, CpError> {
    let url = format!("{}/runs/claim", state.config.backend_url);
    let resp = state
        .client
        .post(&url)
        .json(&ClaimRequest { worker_id })
        .send()
        .await
        .map_err(http_err)?;
    if !resp.status().is_success() {
        return Err(CpError::new(
            ErrorCode::Internal,
            format!("claim request returned {}", resp.status()),
        ));
    }
    let envelope: ResponseEnvelope<Option<ClaimResponse>> = resp.json().await.map_err(http_err)?;
    let Some(claim) = envelope.data else {
        return Ok(false);
    };

    if let Err(e) = process_claimed_run(state, &claim.run, &claim.claim_token).await {
        tracing::error!(run_id = %claim.run.id, error = %e, "run dispatch failed");
        report_failure(state, claim.run.id, &claim.claim_token, &e).await;
    }
    Ok(true)
}

async fn process_claimed_run(
    state: &ManagerState,
    run: &AgentRun,
    claim_token: &str,
) -> Result<(), CpError> {
    let session = fetch_session(state, run.session_id).await?;

    let side_reads = HttpSideReads::new(state.client.clone(), state.config.backend_url.clone());
    let resolver = Resolver::new(&side_reads);
    let resolved = resolver.resolve(&session.user_id, &run.config_snapshot).await?;

    let session_dir = state.session_dir(run.session_id);
    tokio::fs::create_dir_all(&session_dir).await.map_err(|e| {
        CpError::new(ErrorCode::AttachmentStagingFailed, "failed to create session workspace dir")
            .with_source(e)
    })?;

    let input_files = resolved
        .as_map()
        .and_then(|m| m.get("input_files"))
        .cloned()
        .unwrap_or_else(ConfigValue::empty_map);
    let inputs: Vec<InputFile> = match input_files {
        ConfigValue::List(items) => serde_json::from_value(serde_json::Value::Array(
            items.into_iter().map(Into::into).collect(),
        ))
        .map_err(|e| {
            CpError::new(ErrorCode::AttachmentStagingFailed, "malformed input_files").with_source(e)
        })?,
        _ => Vec::new(),
    };
    stage_inputs(state.blob_store.as_ref(), &session_dir, &inputs).await?;

    state.sessions.write().await.insert(run.session_id, session_dir.clone());

    let task = ExecutorTask {
        run_id: run.id,
        session_id: run.session_id,
        claim_token: claim_token.to_string(),
        workspace_dir: session_dir,
        resolved_config: resolved,
    };
    state.executor.execute(task).await
}

async fn fetch_session(state: &ManagerState, session_id: Uuid) -> Result<cp_core::AgentSession, CpError> {
    let url = format!("{}/internal/sessions/{session_id}", state.config.backend_url);
    let resp = state.client.get(&url).send().await.map_err(http_err)?;
    if !resp.status().is_success() {
        return Err(CpError::new(
            ErrorCode::Internal,
            format!("internal session lookup returned {}", resp.status()),
        ));
    }
    let envelope: ResponseEnvelope<cp_core::AgentSession> = resp.json().await.map_err(http_err)?;
    Ok(envelope.data)
}

/// Best-effort: report a dispatch-time failure (resolution or staging, not
/// an executor-side error — those go through the executor's own callbacks)
/// back to the backend so the run doesn't sit `claimed` forever.
async fn report_failure(state: &ManagerState, run_id: Uuid, claim_token: &str, cause: &CpError) {
    let url = format!("{}/runs/{run_id}/fail", state.config.backend_url);
    let body = serde_json::json!({
        "claim_token": claim_token,
        "error": RunError {
            code: cause.code.as_str().to_string(),
            message: cause.message.clone(),
            details: None,
        },
    });
    if let Err(e) = state.client.post(&url).json(&body).send().await {
        tracing::error!(run_id = %run_id, error = %e, "failed to report dispatch failure to backend");
    }
}
