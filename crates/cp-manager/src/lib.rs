//! `cp-manager` — the executor dispatch loop for the control plane.
//!
//! Claims queued runs from `cp-backend`, resolves per-user configuration
//! through [`cp_resolver::Resolver`] (side reads proxied over HTTP), stages
//! attachments and repositories into a per-session workspace directory via
//! `cp-stager`, and hands the staged task to an executor. Also serves the
//! read-only internal endpoints `cp-backend` proxies workspace-file reads
//! to, for sessions this process is currently running.

#![deny(unsafe_code)]

pub mod dispatch;
pub mod side_reads;
pub mod workspace;

use axum::routing::get;
use axum::Router;
use cp_config::ManagerConfig;
use cp_executor::NoopExecutor;
use cp_stager::{BlobStore, LocalDiskBlobStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Shared state for the dispatch loop and the internal workspace server.
pub struct ManagerState {
    /// Process configuration.
    pub config: ManagerConfig,
    /// Client used for every call back to `cp-backend`.
    pub client: reqwest::Client,
    /// Object store the stager fetches `file`-kind attachments from.
    pub blob_store: Arc<dyn BlobStore>,
    /// Minimal in-process executor driving callback posts.
    pub executor: NoopExecutor,
    /// Sessions this process has staged, by id, mapped to their workspace
    /// root directory. Only populated for runs this process itself claimed.
    pub sessions: RwLock<HashMap<Uuid, PathBuf>>,
}

impl ManagerState {
    /// Build state from config; constructs the local-disk blob store and
    /// the `reqwest` client used for both dispatch and side reads.
    pub fn new(config: ManagerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .build()
            .expect("reqwest client configuration is valid");
        let blob_store: Arc<dyn BlobStore> = Arc::new(LocalDiskBlobStore::new(&config.blob_store_root));
        let executor = NoopExecutor::new(client.clone(), config.backend_url.clone());
        Self {
            config,
            client,
            blob_store,
            executor,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Directory a claimed session's workspace is staged under.
    pub fn session_dir(&self, session_id: Uuid) -> PathBuf {
        PathBuf::from(&self.config.workspace_root).join(session_id.to_string())
    }
}

/// Build the internal Axum router (workspace file reads only — the
/// dispatch loop itself runs independently via [`dispatch::run_dispatch_pool`]).
pub fn build_app(state: Arc<ManagerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/internal/sessions/{id}/workspace/files", get(workspace::list_files))
        .route("/internal/sessions/{id}/workspace/file", get(workspace::get_file))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
