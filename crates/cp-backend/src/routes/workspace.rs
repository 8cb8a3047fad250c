//! Workspace file browsing — proxied to whichever `cp-manager` instance
//! currently owns the session's staged directory.
//!
//! The backend never touches the workspace filesystem itself; it forwards
//! to the manager's own internal endpoints and rewrites file links so a
//! caller only ever talks to the backend.

use crate::{AppState, UserId};
use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use axum::Json;
use cp_error::{CpError, ErrorCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// One entry in a workspace file listing, as returned to API callers.
#[derive(Debug, Serialize)]
pub struct WorkspaceFileEntry {
    pub path: String,
    pub size: Option<i64>,
    pub is_dir: bool,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ManagerFileEntry {
    path: String,
    size: Option<i64>,
    is_dir: bool,
}

fn manager_request_failed(e: reqwest::Error) -> CpError {
    CpError::new(ErrorCode::BlobStoreError, format!("manager request failed: {e}"))
}

/// `GET /sessions/{id}/workspace/files`.
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    user: UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<WorkspaceFileEntry>>, CpError> {
    cp_db::sessions::get(&state.pool, &user.0, id).await?;

    let url = format!("{}/internal/sessions/{id}/workspace/files", state.config.manager_url);
    let resp = state.http.get(&url).send().await.map_err(manager_request_failed)?;
    if !resp.status().is_success() {
        return Err(CpError::new(
            ErrorCode::BlobStoreError,
            format!("manager returned {}", resp.status()),
        ));
    }
    let entries: Vec<ManagerFileEntry> = resp.json().await.map_err(manager_request_failed)?;

    let rewritten = entries
        .into_iter()
        .map(|e| WorkspaceFileEntry {
            url: format!(
                "/sessions/{id}/workspace/file?path={}",
                urlencoding::encode(&e.path)
            ),
            path: e.path,
            size: e.size,
            is_dir: e.is_dir,
        })
        .collect();
    Ok(Json(rewritten))
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub path: String,
}

/// `GET /sessions/{id}/workspace/file?path=…` — a 307 redirect into the
/// manager's internal endpoint, which streams the file itself.
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    user: UserId,
    Path(id): Path<Uuid>,
    Query(q): Query<FileQuery>,
) -> Result<Redirect, CpError> {
    cp_db::sessions::get(&state.pool, &user.0, id).await?;
    let url = format!(
        "{}/internal/sessions/{id}/workspace/file?path={}",
        state.config.manager_url,
        urlencoding::encode(&q.path)
    );
    Ok(Redirect::temporary(&url))
}
