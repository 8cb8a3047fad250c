//! `cp-executor` — a minimal in-process stand-in for a real agent runtime.
//!
//! [`NoopExecutor`] performs no actual agent work: it accepts a prepared
//! [`ExecutorTask`], starts the run, and posts a deterministic, realistic
//! sequence of callbacks (a session-state patch, one assistant message, one
//! tool call, a usage record, and a terminal `run.succeeded`) back to
//! `cp-backend`. It exists so the callback sink and run lifecycle are
//! exercisable end to end without a real executor behind them.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::Utc;
use cp_core::ConfigValue;
use cp_error::{CpError, ErrorCode};
use std::path::PathBuf;
use uuid::Uuid;

/// A prepared run, handed off by the manager once a run's config is
/// resolved and its inputs are staged.
#[derive(Debug, Clone)]
pub struct ExecutorTask {
    /// The run being executed.
    pub run_id: Uuid,
    /// The run's owning session.
    pub session_id: Uuid,
    /// Proves this executor currently holds the run's claim.
    pub claim_token: String,
    /// Staged workspace directory for this session.
    pub workspace_dir: PathBuf,
    /// Fully resolved configuration (env substituted, presets expanded).
    pub resolved_config: ConfigValue,
}

fn callback_err(e: reqwest::Error) -> CpError {
    CpError::new(ErrorCode::CallbackDeliveryFailed, format!("callback post failed: {e}"))
}

/// Deterministic no-op executor: does no real agent work, but drives the
/// full callback sequence a real one would.
pub struct NoopExecutor {
    client: reqwest::Client,
    backend_url: String,
}

impl NoopExecutor {
    /// Bind to the backend base URL callbacks are posted to.
    pub fn new(client: reqwest::Client, backend_url: impl Into<String>) -> Self {
        Self { client, backend_url: backend_url.into() }
    }

    async fn post_callback(&self, body: serde_json::Value) -> Result<(), CpError> {
        let url = format!("{}/callback", self.backend_url);
        let resp = self.client.post(&url).json(&body).send().await.map_err(callback_err)?;
        if !resp.status().is_success() {
            return Err(CpError::new(
                ErrorCode::CallbackDeliveryFailed,
                format!("callback rejected with {}", resp.status()),
            ));
        }
        Ok(())
    }

    /// Run the task: start the run, then post the deterministic callback
    /// sequence described in the module docs.
    pub async fn execute(&self, task: ExecutorTask) -> Result<(), CpError> {
        let sdk_session_id = format!("sdk-{}", task.session_id);
        let start_url = format!("{}/runs/{}/start", self.backend_url, task.run_id);
        let resp = self
            .client
            .post(&start_url)
            .json(&serde_json::json!({
                "claim_token": task.claim_token,
                "sdk_session_id": sdk_session_id,
            }))
            .send()
            .await
            .map_err(callback_err)?;
        if !resp.status().is_success() {
            return Err(CpError::new(
                ErrorCode::CallbackDeliveryFailed,
                format!("run start rejected with {}", resp.status()),
            ));
        }

        let tool_count = task
            .resolved_config
            .as_map()
            .and_then(|m| m.get("mcp_config"))
            .and_then(ConfigValue::as_map)
            .map_or(0, std::collections::BTreeMap::len);

        self.post_callback(serde_json::json!({
            "kind": "session.state",
            "session_id": task.session_id,
            "sdk_session_id": sdk_session_id,
            "state_patch": {"last_run_id": task.run_id.to_string()},
        }))
        .await?;

        self.post_callback(serde_json::json!({
            "kind": "message.appended",
            "session_id": task.session_id,
            "role": "assistant",
            "content": {"blocks": [{"type": "text", "text": "Done."}]},
            "text_preview": "Done.",
        }))
        .await?;

        let tool_execution_id = Uuid::new_v4();
        let started_at = Utc::now();
        self.post_callback(serde_json::json!({
            "kind": "tool.started",
            "id": tool_execution_id,
            "session_id": task.session_id,
            "run_id": task.run_id,
            "tool_name": "noop",
            "input": {"mcp_servers": tool_count},
            "started_at": started_at,
        }))
        .await?;

        self.post_callback(serde_json::json!({
            "kind": "tool.finished",
            "id": tool_execution_id,
            "output": {"ok": true},
            "finished_at": Utc::now(),
        }))
        .await?;

        self.post_callback(serde_json::json!({
            "kind": "usage.recorded",
            "run_id": task.run_id,
            "tool_execution_id": tool_execution_id,
            "input_tokens": 32,
            "output_tokens": 8,
            "cost_usd": 0.0004,
        }))
        .await?;

        let workspace_prefix = format!("sessions/{}", task.session_id);
        self.post_callback(serde_json::json!({
            "kind": "run.succeeded",
            "run_id": task.run_id,
            "claim_token": task.claim_token,
            "workspace_prefix": workspace_prefix,
            "workspace_manifest_key": format!("workspace-exports/{}/manifest.json", task.session_id),
            "workspace_archive_key": format!("workspace-exports/{}/archive.tar.gz", task.session_id),
        }))
        .await?;

        tracing::info!(run_id = %task.run_id, workspace_dir = %task.workspace_dir.display(), "run completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn respond_ok(server: &MockServer, path: &str) {
        Mock::given(method("POST"))
            .and(path_regex(path))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "message": "ok",
                "data": Value::Null,
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn posts_full_callback_sequence_and_succeeds() {
        let server = MockServer::start().await;
        respond_ok(&server, "^/runs/.*/start$").await;
        respond_ok(&server, "^/callback$").await;

        let executor = NoopExecutor::new(reqwest::Client::new(), server.uri());
        let task = ExecutorTask {
            run_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            claim_token: "tok".to_string(),
            workspace_dir: PathBuf::from("/tmp/workspace"),
            resolved_config: ConfigValue::empty_map(),
        };

        executor.execute(task).await.unwrap();
    }

    #[tokio::test]
    async fn start_failure_short_circuits_before_any_callback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex("^/runs/.*/start$"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let executor = NoopExecutor::new(reqwest::Client::new(), server.uri());
        let task = ExecutorTask {
            run_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            claim_token: "tok".to_string(),
            workspace_dir: PathBuf::from("/tmp/workspace"),
            resolved_config: ConfigValue::empty_map(),
        };

        let err = executor.execute(task).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::CallbackDeliveryFailed);
    }
}
