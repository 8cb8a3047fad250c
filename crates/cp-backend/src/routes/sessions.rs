//! Session reads/creation, and the legacy `with_titles` listing.

use crate::envelope::Envelope;
use crate::{AppState, UserId};
use axum::extract::{Path, Query, State};
use axum::Json;
use cp_core::{AgentMessage, AgentSession, ConfigValue};
use cp_db::Page;
use cp_error::CpError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub config_snapshot: serde_json::Value,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default)]
    pub with_titles: bool,
}

impl From<&ListQuery> for Page {
    fn from(q: &ListQuery) -> Self {
        match q.limit {
            Some(limit) => Page {
                limit: Some(limit),
                offset: q.offset.unwrap_or(0),
            },
            None => Page {
                limit: None,
                offset: q.offset.unwrap_or(0),
            },
        }
    }
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    user: UserId,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Envelope<AgentSession>, CpError> {
    let snapshot: ConfigValue = req.config_snapshot.into();
    let session = cp_db::sessions::create(&state.pool, &user.0, req.project_id, &snapshot).await?;
    Ok(Envelope::ok(session))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    user: UserId,
    Path(id): Path<Uuid>,
) -> Result<Envelope<AgentSession>, CpError> {
    let session = cp_db::sessions::get(&state.pool, &user.0, id).await?;
    Ok(Envelope::ok(session))
}

/// A session row, plus its first user message text for the legacy listing.
#[derive(Debug, Serialize)]
pub struct SessionWithTitle {
    #[serde(flatten)]
    pub session: AgentSession,
    pub title: Option<String>,
}

/// `GET /sessions` — or, with `?with_titles=true`, the legacy
/// `list_by_user_with_messages`-equivalent listing that eager-loads each
/// session's first message as a display title.
pub async fn list(
    State(state): State<Arc<AppState>>,
    user: UserId,
    Query(q): Query<ListQuery>,
) -> Result<Envelope<serde_json::Value>, CpError> {
    let page = Page::from(&q);
    let sessions = cp_db::sessions::list(&state.pool, &user.0, page).await?;

    if !q.with_titles {
        return Ok(Envelope::ok(serde_json::to_value(sessions).unwrap()));
    }

    let mut with_titles = Vec::with_capacity(sessions.len());
    for session in sessions {
        let messages = cp_db::messages::list_by_session(&state.pool, session.id).await?;
        let title = messages
            .iter()
            .find(|m| m.role == cp_core::MessageRole::User)
            .and_then(|m| m.text_preview.clone());
        with_titles.push(SessionWithTitle { session, title });
    }
    Ok(Envelope::ok(serde_json::to_value(with_titles).unwrap()))
}

pub async fn messages(
    State(state): State<Arc<AppState>>,
    user: UserId,
    Path(id): Path<Uuid>,
) -> Result<Envelope<Vec<AgentMessage>>, CpError> {
    // Scope by ownership before returning the session's transcript.
    cp_db::sessions::get(&state.pool, &user.0, id).await?;
    let messages = cp_db::messages::list_by_session(&state.pool, id).await?;
    Ok(Envelope::ok(messages))
}

pub async fn tool_executions(
    State(state): State<Arc<AppState>>,
    user: UserId,
    Path(id): Path<Uuid>,
) -> Result<Envelope<Vec<cp_core::ToolExecution>>, CpError> {
    cp_db::sessions::get(&state.pool, &user.0, id).await?;
    let executions = cp_db::tool_executions::list_by_session(&state.pool, id).await?;
    Ok(Envelope::ok(executions))
}

#[derive(Debug, Deserialize)]
pub struct SubmitPromptRequest {
    pub content: serde_json::Value,
    #[serde(default)]
    pub text_preview: Option<String>,
    #[serde(default)]
    pub config_snapshot: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct SubmitPromptResponse {
    pub message: AgentMessage,
    pub run: cp_core::AgentRun,
}

/// `POST /sessions/{id}/messages` — submit a prompt, spawning a queued run.
pub async fn submit_prompt(
    State(state): State<Arc<AppState>>,
    user: UserId,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitPromptRequest>,
) -> Result<Envelope<SubmitPromptResponse>, CpError> {
    let session = cp_db::sessions::get(&state.pool, &user.0, id).await?;
    let content: ConfigValue = req.content.into();
    let snapshot: ConfigValue = req
        .config_snapshot
        .map(ConfigValue::from)
        .unwrap_or(session.config_snapshot);

    let (message, run) =
        cp_db::runs::submit(&state.pool, id, &content, req.text_preview.as_deref(), &snapshot).await?;
    Ok(Envelope::ok(SubmitPromptResponse { message, run }))
}

pub async fn usage(
    State(state): State<Arc<AppState>>,
    user: UserId,
    Path(id): Path<Uuid>,
) -> Result<Envelope<Vec<cp_core::UsageLog>>, CpError> {
    cp_db::sessions::get(&state.pool, &user.0, id).await?;
    let usage = cp_db::usage::list_by_session(&state.pool, id).await?;
    Ok(Envelope::ok(usage))
}
