//! HTTP-client [`SideReads`] implementation, proxying to `cp-backend`'s
//! internal endpoints rather than reading `cp-db` directly — the manager
//! runs as a separate process and never touches Postgres.

use async_trait::async_trait;
use cp_core::ConfigValue;
use cp_error::{CpError, ErrorCode};
use cp_resolver::SideReads;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct ResponseEnvelope<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct IdsRequest<'a> {
    ids: &'a [i64],
}

fn http_err(e: reqwest::Error) -> CpError {
    CpError::new(ErrorCode::Internal, format!("backend request failed: {e}"))
}

/// Proxies the resolver's side reads over HTTP to `cp-backend`'s
/// `/internal/users/{user_id}/...` endpoints.
pub struct HttpSideReads {
    client: reqwest::Client,
    backend_url: String,
}

impl HttpSideReads {
    /// Bind to a backend base URL (e.g. `http://127.0.0.1:8080`).
    pub fn new(client: reqwest::Client, backend_url: impl Into<String>) -> Self {
        Self { client, backend_url: backend_url.into() }
    }
}

#[async_trait]
impl SideReads for HttpSideReads {
    async fn env_map(&self, user_id: &str) -> Result<BTreeMap<String, String>, CpError> {
        let url = format!("{}/internal/users/{}/env", self.backend_url, user_id);
        let resp = self.client.get(&url).send().await.map_err(http_err)?;
        if !resp.status().is_success() {
            return Err(CpError::new(
                ErrorCode::Internal,
                format!("backend env lookup returned {}", resp.status()),
            ));
        }
        let envelope: ResponseEnvelope<BTreeMap<String, String>> =
            resp.json().await.map_err(http_err)?;
        Ok(envelope.data)
    }

    async fn resolve_mcp_config(
        &self,
        user_id: &str,
        server_ids: &[i64],
    ) -> Result<ConfigValue, CpError> {
        let url = format!("{}/internal/users/{}/mcp-config", self.backend_url, user_id);
        let resp = self
            .client
            .post(&url)
            .json(&IdsRequest { ids: server_ids })
            .send()
            .await
            .map_err(http_err)?;
        if !resp.status().is_success() {
            return Err(CpError::new(
                ErrorCode::Internal,
                format!("backend mcp-config lookup returned {}", resp.status()),
            ));
        }
        let envelope: ResponseEnvelope<ConfigValue> = resp.json().await.map_err(http_err)?;
        Ok(envelope.data)
    }

    async fn resolve_skill_config(
        &self,
        user_id: &str,
        skill_ids: &[i64],
    ) -> Result<ConfigValue, CpError> {
        let url = format!("{}/internal/users/{}/skill-config", self.backend_url, user_id);
        let resp = self
            .client
            .post(&url)
            .json(&IdsRequest { ids: skill_ids })
            .send()
            .await
            .map_err(http_err)?;
        if !resp.status().is_success() {
            return Err(CpError::new(
                ErrorCode::Internal,
                format!("backend skill-config lookup returned {}", resp.status()),
            ));
        }
        let envelope: ResponseEnvelope<ConfigValue> = resp.json().await.map_err(http_err)?;
        Ok(envelope.data)
    }
}
