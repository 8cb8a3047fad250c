//! Liveness probes.

use crate::envelope::Envelope;
use axum::response::IntoResponse;
use serde_json::json;

pub async fn health() -> impl IntoResponse {
    Envelope::ok(json!({ "status": "ok" }))
}

pub async fn callback_health() -> impl IntoResponse {
    Envelope::ok(json!({ "status": "ok" }))
}

pub async fn attachments_health() -> impl IntoResponse {
    Envelope::ok(json!({ "status": "ok" }))
}
