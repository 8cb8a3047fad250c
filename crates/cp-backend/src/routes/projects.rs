//! Project CRUD.

use crate::envelope::Envelope;
use crate::{AppState, UserId};
use axum::extract::{Path, Query, State};
use axum::Json;
use cp_db::Page;
use cp_error::CpError;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameProjectRequest {
    pub name: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<ListQuery> for Page {
    fn from(q: ListQuery) -> Self {
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
    Json(req): Json<CreateProjectRequest>,
) -> Result<Envelope<cp_core::Project>, CpError> {
    let project = cp_db::projects::create(&state.pool, &user.0, &req.name).await?;
    Ok(Envelope::ok(project))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    user: UserId,
    Path(id): Path<Uuid>,
) -> Result<Envelope<cp_core::Project>, CpError> {
    let project = cp_db::projects::get(&state.pool, &user.0, id).await?;
    Ok(Envelope::ok(project))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    user: UserId,
    Query(q): Query<ListQuery>,
) -> Result<Envelope<Vec<cp_core::Project>>, CpError> {
    let projects = cp_db::projects::list(&state.pool, &user.0, q.into()).await?;
    Ok(Envelope::ok(projects))
}

pub async fn rename(
    State(state): State<Arc<AppState>>,
    user: UserId,
    Path(id): Path<Uuid>,
    Json(req): Json<RenameProjectRequest>,
) -> Result<Envelope<cp_core::Project>, CpError> {
    let project = cp_db::projects::rename(&state.pool, &user.0, id, &req.name).await?;
    Ok(Envelope::ok(project))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    user: UserId,
    Path(id): Path<Uuid>,
) -> Result<Envelope<serde_json::Value>, CpError> {
    cp_db::projects::soft_delete(&state.pool, &user.0, id).await?;
    Ok(Envelope::ok(serde_json::json!(null)))
}
