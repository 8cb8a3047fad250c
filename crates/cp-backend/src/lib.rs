//! `cp-backend` — the authoritative HTTP store for the control plane.
//!
//! Owns projects, sessions, messages, runs, tool executions, and usage; is
//! the only process that writes to Postgres. The executor manager and
//! executor never touch `cp-db` directly — they go through this service's
//! claim/callback/internal endpoints.

#![deny(unsafe_code)]

pub mod auth;
pub mod envelope;
pub mod middleware;
pub mod routes;

pub use auth::UserId;

use axum::routing::{get, post};
use axum::Router;
use cp_config::BackendConfig;
use cp_stager::BlobStore;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
pub struct AppState {
    /// Connection pool for the control-plane database.
    pub pool: PgPool,
    /// Object store backing attachment uploads.
    pub blob_store: Arc<dyn BlobStore>,
    /// Process configuration (for the manager proxy base URL and the rest).
    pub config: BackendConfig,
    /// Client used to proxy workspace-file reads to `cp-manager`.
    pub http: reqwest::Client,
}

/// Build the Axum router with every backend route.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/callback/health", get(routes::health::callback_health))
        .route("/attachments/health", get(routes::health::attachments_health))
        .route("/projects", post(routes::projects::create).get(routes::projects::list))
        .route(
            "/projects/{id}",
            get(routes::projects::get)
                .patch(routes::projects::rename)
                .delete(routes::projects::delete),
        )
        .route("/sessions", post(routes::sessions::create).get(routes::sessions::list))
        .route("/sessions/{id}", get(routes::sessions::get))
        .route("/sessions/{id}/messages", get(routes::sessions::messages).post(routes::sessions::submit_prompt))
        .route("/sessions/{id}/tool-executions", get(routes::sessions::tool_executions))
        .route("/sessions/{id}/usage", get(routes::sessions::usage))
        .route("/sessions/{id}/workspace/files", get(routes::workspace::list_files))
        .route("/sessions/{id}/workspace/file", get(routes::workspace::get_file))
        .route("/runs/claim", post(routes::runs::claim))
        .route("/runs/session/{id}", get(routes::runs::list_by_session))
        .route("/runs/{id}", get(routes::runs::get))
        .route("/runs/{id}/start", post(routes::runs::start))
        .route("/runs/{id}/fail", post(routes::runs::fail))
        .route("/attachments/upload", post(routes::attachments::upload))
        .route("/callback", post(routes::callback::callback))
        .route("/internal/sessions/{id}", get(routes::internal::get_session))
        .route("/internal/users/{user_id}/env", get(routes::internal::env_map))
        .route("/internal/users/{user_id}/mcp-config", post(routes::internal::mcp_config))
        .route("/internal/users/{user_id}/skill-config", post(routes::internal::skill_config))
        .layer(axum::middleware::from_fn(middleware::request_logger))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
