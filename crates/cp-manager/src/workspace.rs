//! Internal workspace-read endpoints the backend proxies to.
//!
//! Read-only, and only ever serves sessions this manager process staged
//! itself — [`ManagerState::sessions`] is populated as a side effect of
//! [`crate::dispatch::dispatch_once`] claiming and staging a run.

use crate::ManagerState;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use cp_error::{CpError, ErrorCode};
use cp_stager::normalize_relative_path;
use serde::{Deserialize, Serialize};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub size: Option<i64>,
    pub is_dir: bool,
}

async fn session_workspace_dir(state: &ManagerState, id: Uuid) -> Result<PathBuf, CpError> {
    state
        .sessions
        .read()
        .await
        .get(&id)
        .map(|dir| dir.join("workspace"))
        .ok_or_else(|| CpError::new(ErrorCode::SessionNotFound, "session has no workspace on this manager"))
}

/// `GET /internal/sessions/{id}/workspace/files` — recursive listing of
/// everything staged under the session's workspace directory.
pub async fn list_files(
    State(state): State<Arc<ManagerState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<FileEntry>>, CpError> {
    let root = session_workspace_dir(&state, id).await?;
    let mut entries = Vec::new();
    walk(&root, &root, &mut entries).await?;
    Ok(Json(entries))
}

async fn walk(root: &FsPath, dir: &FsPath, out: &mut Vec<FileEntry>) -> Result<(), CpError> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(CpError::new(ErrorCode::Internal, "failed to read workspace directory").with_source(e))
        }
    };
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| CpError::new(ErrorCode::Internal, "failed to read directory entry").with_source(e))?
    {
        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap_or(&path).display().to_string();
        let meta = entry
            .metadata()
            .await
            .map_err(|e| CpError::new(ErrorCode::Internal, "failed to stat workspace entry").with_source(e))?;
        if meta.is_dir() {
            out.push(FileEntry { path: rel, size: None, is_dir: true });
            Box::pin(walk(root, &path, out)).await?;
        } else {
            out.push(FileEntry { path: rel, size: Some(meta.len() as i64), is_dir: false });
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub path: String,
}

/// `GET /internal/sessions/{id}/workspace/file?path=…` — streams one
/// staged file's bytes. Rejects any path that escapes the workspace root.
pub async fn get_file(
    State(state): State<Arc<ManagerState>>,
    Path(id): Path<Uuid>,
    Query(q): Query<FileQuery>,
) -> Result<impl IntoResponse, CpError> {
    let root = session_workspace_dir(&state, id).await?;
    let rel = normalize_relative_path(Some(&q.path))
        .ok_or_else(|| CpError::new(ErrorCode::PathTraversal, "path escapes workspace root"))?;
    let full = root.join(&rel);
    let bytes = tokio::fs::read(&full).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CpError::new(ErrorCode::AttachmentNotFound, "file not found in workspace"),
        _ => CpError::new(ErrorCode::Internal, "failed to read workspace file").with_source(e),
    })?;
    Ok(bytes)
}
