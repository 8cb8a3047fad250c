// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for the control plane binaries.
//!
//! Each binary (`cp-backend`, `cp-manager`) loads an optional TOML file and
//! then applies environment-variable overrides on top, following the same
//! `Option<&Path>` → parse → override shape throughout.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

fn parse_toml<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.display().to_string(),
    })
}

/// Settings for the `cp-backend` HTTP service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BackendConfig {
    /// Postgres connection string.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Address the HTTP server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// How long a run's claim is honored before it is considered orphaned
    /// and eligible for re-claim by another worker.
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,
    /// Maximum request body size accepted on the attachment upload route, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Root directory the local-disk `BlobStore` reads and writes under.
    #[serde(default = "default_blob_store_root")]
    pub blob_store_root: String,
    /// Base URL of the executor manager, used to proxy workspace file routes.
    #[serde(default = "default_manager_url")]
    pub manager_url: String,
    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

fn default_database_url() -> String {
    "postgres://localhost/control_plane".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_claim_ttl_secs() -> u64 {
    30
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_blob_store_root() -> String {
    "/var/lib/control-plane/blobs".to_string()
}

fn default_manager_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            bind_addr: default_bind_addr(),
            claim_ttl_secs: default_claim_ttl_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            blob_store_root: default_blob_store_root(),
            manager_url: default_manager_url(),
            log_level: Some("info".into()),
        }
    }
}

impl BackendConfig {
    /// Load from an optional TOML file, then apply `CP_BACKEND_*` env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => parse_toml(&read_file(p)?)?,
            None => BackendConfig::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `CP_BACKEND_*` environment variable overrides in place.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DATABASE_URL") {
            self.database_url = val;
        }
        if let Ok(val) = std::env::var("CP_BACKEND_BIND_ADDR") {
            self.bind_addr = val;
        }
        if let Ok(val) = std::env::var("CP_BACKEND_CLAIM_TTL_SECS") {
            if let Ok(secs) = val.parse() {
                self.claim_ttl_secs = secs;
            }
        }
        if let Ok(val) = std::env::var("CP_BACKEND_MAX_UPLOAD_BYTES") {
            if let Ok(bytes) = val.parse() {
                self.max_upload_bytes = bytes;
            }
        }
        if let Ok(val) = std::env::var("CP_BACKEND_BLOB_STORE_ROOT") {
            self.blob_store_root = val;
        }
        if let Ok(val) = std::env::var("CP_BACKEND_MANAGER_URL") {
            self.manager_url = val;
        }
        if let Ok(val) = std::env::var("CP_BACKEND_LOG_LEVEL") {
            self.log_level = Some(val);
        }
    }

    /// Validate semantic constraints not expressible in the type itself.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        if self.database_url.trim().is_empty() {
            errors.push("database_url must not be empty".to_string());
        }
        if self.claim_ttl_secs == 0 {
            errors.push("claim_ttl_secs must be greater than zero".to_string());
        }
        if self.max_upload_bytes == 0 {
            errors.push("max_upload_bytes must be greater than zero".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError { reasons: errors })
        }
    }
}

/// Settings for the `cp-manager` executor-dispatch service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ManagerConfig {
    /// Base URL of the `cp-backend` service this manager dispatches against.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// Address the manager's own internal workspace-proxy server binds to.
    #[serde(default = "default_manager_bind_addr")]
    pub bind_addr: String,
    /// Number of concurrent dispatch workers.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    /// Base sleep between claim attempts when a claim returns nothing, in milliseconds.
    #[serde(default = "default_claim_poll_interval_ms")]
    pub claim_poll_interval_ms: u64,
    /// Root directory under which per-session workspaces are staged.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,
    /// Root directory the local-disk `BlobStore` reads attachments from.
    /// Assumes a single-node or shared-disk deployment where this matches
    /// the backend's own `blob_store_root`.
    #[serde(default = "default_manager_blob_store_root")]
    pub blob_store_root: String,
    /// Timeout applied to outbound HTTP calls to the backend and to git clones.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Log level override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_manager_bind_addr() -> String {
    "127.0.0.1:8081".to_string()
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_claim_poll_interval_ms() -> u64 {
    250
}

fn default_workspace_root() -> String {
    "/var/lib/control-plane/workspaces".to_string()
}

fn default_manager_blob_store_root() -> String {
    "/var/lib/control-plane/blobs".to_string()
}

fn default_http_timeout_secs() -> u64 {
    5
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            bind_addr: default_manager_bind_addr(),
            worker_concurrency: default_worker_concurrency(),
            claim_poll_interval_ms: default_claim_poll_interval_ms(),
            workspace_root: default_workspace_root(),
            blob_store_root: default_manager_blob_store_root(),
            http_timeout_secs: default_http_timeout_secs(),
            log_level: Some("info".into()),
        }
    }
}

impl ManagerConfig {
    /// Load from an optional TOML file, then apply `CP_MANAGER_*` env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => parse_toml(&read_file(p)?)?,
            None => ManagerConfig::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `CP_MANAGER_*` environment variable overrides in place.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CP_MANAGER_BACKEND_URL") {
            self.backend_url = val;
        }
        if let Ok(val) = std::env::var("CP_MANAGER_BIND_ADDR") {
            self.bind_addr = val;
        }
        if let Ok(val) = std::env::var("CP_MANAGER_WORKER_CONCURRENCY") {
            if let Ok(n) = val.parse() {
                self.worker_concurrency = n;
            }
        }
        if let Ok(val) = std::env::var("CP_MANAGER_CLAIM_POLL_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                self.claim_poll_interval_ms = ms;
            }
        }
        if let Ok(val) = std::env::var("CP_MANAGER_WORKSPACE_ROOT") {
            self.workspace_root = val;
        }
        if let Ok(val) = std::env::var("CP_MANAGER_BLOB_STORE_ROOT") {
            self.blob_store_root = val;
        }
        if let Ok(val) = std::env::var("CP_MANAGER_HTTP_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                self.http_timeout_secs = secs;
            }
        }
        if let Ok(val) = std::env::var("CP_MANAGER_LOG_LEVEL") {
            self.log_level = Some(val);
        }
    }

    /// Validate semantic constraints not expressible in the type itself.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        if self.worker_concurrency == 0 {
            errors.push("worker_concurrency must be greater than zero".to_string());
        }
        if self.backend_url.trim().is_empty() {
            errors.push("backend_url must not be empty".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError { reasons: errors })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn backend_default_is_valid() {
        let cfg = BackendConfig::default();
        cfg.validate().expect("default should validate");
        assert_eq!(cfg.bind_addr, "127.0.0.1:8080");
    }

    #[test]
    fn backend_parse_toml_string() {
        let toml_src = r#"
            database_url = "postgres://db/test"
            bind_addr = "0.0.0.0:9000"
            claim_ttl_secs = 60
        "#;
        let cfg: BackendConfig = parse_toml(toml_src).unwrap();
        assert_eq!(cfg.database_url, "postgres://db/test");
        assert_eq!(cfg.bind_addr, "0.0.0.0:9000");
        assert_eq!(cfg.claim_ttl_secs, 60);
        // fields omitted from the TOML fall back to their defaults
        assert_eq!(cfg.max_upload_bytes, default_max_upload_bytes());
    }

    #[test]
    fn backend_invalid_toml_gives_parse_error() {
        let err = parse_toml::<BackendConfig>("not [ valid = toml").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn backend_load_missing_file_gives_file_not_found() {
        let err = BackendConfig::load(Some(Path::new("/nonexistent/cp-backend.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn backend_load_none_returns_default() {
        let cfg = BackendConfig::load(None).unwrap();
        assert_eq!(cfg.bind_addr, default_bind_addr());
    }

    #[test]
    fn backend_load_from_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp-backend.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "bind_addr = \"0.0.0.0:7000\"").unwrap();
        let cfg = BackendConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:7000");
    }

    #[test]
    fn backend_validate_catches_zero_ttl() {
        let cfg = BackendConfig {
            claim_ttl_secs: 0,
            ..BackendConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("claim_ttl_secs")));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn manager_default_is_valid() {
        let cfg = ManagerConfig::default();
        cfg.validate().expect("default should validate");
        assert_eq!(cfg.worker_concurrency, 4);
    }

    #[test]
    fn manager_validate_catches_zero_concurrency() {
        let cfg = ManagerConfig {
            worker_concurrency: 0,
            ..ManagerConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn manager_parse_toml_string() {
        let toml_src = r#"
            backend_url = "http://backend:8080"
            worker_concurrency = 8
        "#;
        let cfg: ManagerConfig = parse_toml(toml_src).unwrap();
        assert_eq!(cfg.backend_url, "http://backend:8080");
        assert_eq!(cfg.worker_concurrency, 8);
    }

    #[test]
    fn config_error_display() {
        let e = ConfigError::FileNotFound { path: "/foo".into() };
        assert!(e.to_string().contains("/foo"));
        let e = ConfigError::ParseError { reason: "bad".into() };
        assert!(e.to_string().contains("bad"));
        let e = ConfigError::ValidationError { reasons: vec!["x".into()] };
        assert!(e.to_string().contains('x'));
    }
}
