//! Unified error taxonomy with stable error codes for the control plane.
//!
//! Every control-plane error carries an [`ErrorCode`] (a machine-readable,
//! stable string tag), a human-readable message, an optional cause chain,
//! and arbitrary key-value context. Use the builder returned by
//! [`CpError::new`] to construct errors fluently; the [`axum::response::IntoResponse`]
//! impl renders the wire envelope the HTTP API promises callers.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed or missing request data.
    Request,
    /// Caller is not authenticated or not authorized for the resource.
    Auth,
    /// Session, run, project, or attachment lookup failures.
    NotFound,
    /// State-machine violations (e.g. claiming an already-claimed run).
    Conflict,
    /// Configuration resolution failures.
    Config,
    /// Attachment staging / git clone failures.
    Staging,
    /// Failures in the Postgres-backed repository layer.
    Database,
    /// Failures calling out to another service (executor callback, object store).
    External,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Request => "request",
            Self::Auth => "auth",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Config => "config",
            Self::Staging => "staging",
            Self::Database => "database",
            Self::External => "external",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Request --
    /// Request body failed validation or JSON parsing.
    BadRequest,

    // -- Auth --
    /// No credentials were presented.
    Unauthorized,
    /// Credentials were presented but do not grant access to this resource.
    Forbidden,

    // -- NotFound --
    /// Requested session does not exist or is not visible to the caller.
    SessionNotFound,
    /// Requested run does not exist or is not visible to the caller.
    RunNotFound,
    /// Requested project does not exist or is not visible to the caller.
    ProjectNotFound,
    /// Requested attachment does not exist.
    AttachmentNotFound,
    /// Requested message does not exist within its session.
    MessageNotFound,
    /// Requested tool execution does not exist.
    ToolExecutionNotFound,

    // -- Conflict --
    /// A claim was attempted on a run that is not queued.
    RunAlreadyClaimed,
    /// A callback or transition was submitted against a claim token that no
    /// longer matches the run's current holder.
    StaleClaim,
    /// A requested state transition is not valid from the run's current status.
    InvalidTransition,

    // -- Config --
    /// An `${env:NAME}` reference had no value and no default.
    EnvVarNotFound,
    /// A referenced MCP or skill preset id does not exist.
    PresetNotFound,

    // -- Staging --
    /// Staging a file attachment into the workspace failed.
    AttachmentStagingFailed,
    /// A staged path attempted to escape the workspace root.
    PathTraversal,

    // -- Database --
    /// A Postgres query failed.
    DatabaseError,
    /// A migration failed to apply at startup.
    MigrationFailed,

    // -- External --
    /// Cloning a git repository into the workspace failed.
    GitCloneFailed,
    /// The object store rejected an upload or download.
    BlobStoreError,
    /// A callback to a downstream consumer failed.
    CallbackDeliveryFailed,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    #[must_use]
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::BadRequest => ErrorCategory::Request,

            Self::Unauthorized => ErrorCategory::Auth,
            Self::Forbidden => ErrorCategory::Auth,

            Self::SessionNotFound
            | Self::RunNotFound
            | Self::ProjectNotFound
            | Self::AttachmentNotFound
            | Self::MessageNotFound
            | Self::ToolExecutionNotFound => ErrorCategory::NotFound,

            Self::RunAlreadyClaimed | Self::StaleClaim | Self::InvalidTransition => {
                ErrorCategory::Conflict
            }

            Self::EnvVarNotFound | Self::PresetNotFound => ErrorCategory::Config,

            Self::AttachmentStagingFailed | Self::PathTraversal => ErrorCategory::Staging,

            Self::DatabaseError | Self::MigrationFailed => ErrorCategory::Database,

            Self::GitCloneFailed | Self::BlobStoreError | Self::CallbackDeliveryFailed => {
                ErrorCategory::External
            }

            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// The `StatusCode` this error renders as over HTTP.
    #[must_use]
    pub fn status_code(self) -> StatusCode {
        match self.category() {
            ErrorCategory::Request => StatusCode::BAD_REQUEST,
            ErrorCategory::Auth => match self {
                Self::Forbidden => StatusCode::FORBIDDEN,
                _ => StatusCode::UNAUTHORIZED,
            },
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::Config => StatusCode::BAD_REQUEST,
            ErrorCategory::Staging => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::Database | ErrorCategory::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorCategory::External => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"RUN_ALREADY_CLAIMED"`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::RunNotFound => "RUN_NOT_FOUND",
            Self::ProjectNotFound => "PROJECT_NOT_FOUND",
            Self::AttachmentNotFound => "ATTACHMENT_NOT_FOUND",
            Self::MessageNotFound => "MESSAGE_NOT_FOUND",
            Self::ToolExecutionNotFound => "TOOL_EXECUTION_NOT_FOUND",
            Self::RunAlreadyClaimed => "RUN_ALREADY_CLAIMED",
            Self::StaleClaim => "STALE_CLAIM",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::EnvVarNotFound => "ENV_VAR_NOT_FOUND",
            Self::PresetNotFound => "PRESET_NOT_FOUND",
            Self::AttachmentStagingFailed => "ATTACHMENT_STAGING_FAILED",
            Self::GitCloneFailed => "GIT_CLONE_FAILED",
            Self::PathTraversal => "PATH_TRAVERSAL",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::MigrationFailed => "MIGRATION_FAILED",
            Self::BlobStoreError => "BLOB_STORE_ERROR",
            Self::CallbackDeliveryFailed => "CALLBACK_DELIVERY_FAILED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CpError
// ---------------------------------------------------------------------------

/// Unified control-plane error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use cp_error::{CpError, ErrorCode};
///
/// let err = CpError::new(ErrorCode::GitCloneFailed, "clone exited with status 128")
///     .with_context("repo", "https://github.com/example/repo")
///     .with_context("attempt", 1);
/// ```
pub struct CpError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl CpError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Shorthand constructors for the categories the backend raises most.
    pub fn not_found(code: ErrorCode, message: impl Into<String>) -> Self {
        debug_assert_eq!(code.category(), ErrorCategory::NotFound);
        Self::new(code, message)
    }

    /// Shorthand for a database error wrapping a `sqlx::Error`.
    pub fn database(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(ErrorCode::DatabaseError, source.to_string()).with_source(source)
    }
}

impl fmt::Debug for CpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("CpError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for CpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for CpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Wire envelope rendered on every non-2xx HTTP response.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ErrorEnvelope {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<BTreeMap<String, serde_json::Value>>,
}

impl IntoResponse for CpError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code.as_str(), message = %self.message, "request failed");
        } else {
            tracing::warn!(code = self.code.as_str(), message = %self.message, "request rejected");
        }
        let data = if self.context.is_empty() {
            None
        } else {
            Some(self.context)
        };
        let body = ErrorEnvelope {
            code: self.code.as_str(),
            message: self.message,
            data,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::BadRequest,
        ErrorCode::Unauthorized,
        ErrorCode::Forbidden,
        ErrorCode::SessionNotFound,
        ErrorCode::RunNotFound,
        ErrorCode::ProjectNotFound,
        ErrorCode::AttachmentNotFound,
        ErrorCode::MessageNotFound,
        ErrorCode::ToolExecutionNotFound,
        ErrorCode::RunAlreadyClaimed,
        ErrorCode::StaleClaim,
        ErrorCode::InvalidTransition,
        ErrorCode::EnvVarNotFound,
        ErrorCode::PresetNotFound,
        ErrorCode::AttachmentStagingFailed,
        ErrorCode::GitCloneFailed,
        ErrorCode::PathTraversal,
        ErrorCode::DatabaseError,
        ErrorCode::MigrationFailed,
        ErrorCode::BlobStoreError,
        ErrorCode::CallbackDeliveryFailed,
        ErrorCode::Internal,
    ];

    #[test]
    fn basic_construction() {
        let err = CpError::new(ErrorCode::Internal, "boom");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "boom");
        assert!(err.source.is_none());
        assert!(err.context.is_empty());
    }

    #[test]
    fn display_without_context() {
        let err = CpError::new(ErrorCode::RunNotFound, "no such run");
        assert_eq!(err.to_string(), "[RUN_NOT_FOUND] no such run");
    }

    #[test]
    fn display_with_context() {
        let err = CpError::new(ErrorCode::GitCloneFailed, "clone failed")
            .with_context("exit_code", 128);
        let s = err.to_string();
        assert!(s.starts_with("[GIT_CLONE_FAILED] clone failed"));
        assert!(s.contains("exit_code"));
    }

    #[test]
    fn debug_with_source() {
        let src = io::Error::new(io::ErrorKind::NotFound, "file missing");
        let err = CpError::new(ErrorCode::AttachmentStagingFailed, "stage failed").with_source(src);
        let dbg = format!("{err:?}");
        assert!(dbg.contains("source"));
        assert!(dbg.contains("file missing"));
    }

    #[test]
    fn status_codes_match_category() {
        assert_eq!(ErrorCode::BadRequest.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::RunNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::RunAlreadyClaimed.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ErrorCode::DatabaseError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorCode::BlobStoreError.status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ErrorCode::GitCloneFailed.status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn all_codes_have_unique_as_str() {
        let mut seen = HashSet::new();
        for code in ALL_CODES {
            assert!(seen.insert(code.as_str()), "duplicate as_str for {code:?}");
        }
        assert_eq!(seen.len(), ALL_CODES.len());
    }

    #[test]
    fn all_codes_display_matches_as_str() {
        for code in ALL_CODES {
            assert_eq!(code.to_string(), code.as_str());
        }
    }

    #[test]
    fn error_code_serde_roundtrip() {
        let code = ErrorCode::RunAlreadyClaimed;
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, r#""RUN_ALREADY_CLAIMED""#);
        let back: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, code);
    }

    #[test]
    fn category_shorthand() {
        let err = CpError::new(ErrorCode::PresetNotFound, "no such preset");
        assert_eq!(err.category(), ErrorCategory::Config);
    }
}
