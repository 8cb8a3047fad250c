//! Persisted domain entities.
//!
//! These mirror the tables owned by the backend service (`cp-db`), plus the
//! descriptors (`InputFile`) that flow through the resolver and stager
//! without ever being stored on their own.

use crate::value::ConfigValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Status of an [`AgentSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, no run has started yet.
    Pending,
    /// A run is actively executing.
    Running,
    /// The session's last run succeeded.
    Completed,
    /// The session's last run failed.
    Failed,
    /// The session was cancelled.
    Cancelled,
}

impl SessionStatus {
    /// Stable lowercase form stored in the `sessions.status` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    /// Parse the column form written by [`SessionStatus::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => SessionStatus::Pending,
            "running" => SessionStatus::Running,
            "completed" => SessionStatus::Completed,
            "failed" => SessionStatus::Failed,
            "cancelled" => SessionStatus::Cancelled,
            _ => return None,
        })
    }
}

/// Status of an [`AgentRun`]. See the run lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, waiting to be claimed.
    Queued,
    /// Claimed by a worker, not yet started.
    Claimed,
    /// Started; the executor is actively working.
    Running,
    /// Terminal: completed successfully.
    Succeeded,
    /// Terminal: completed with an error.
    Failed,
    /// Terminal: cancelled before or during execution.
    Cancelled,
}

impl RunStatus {
    /// Terminal statuses are fixed points; no further transition is valid.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled)
    }

    /// Stable lowercase form stored in the `runs.status` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Claimed => "claimed",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    /// Parse the column form written by [`RunStatus::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "queued" => RunStatus::Queued,
            "claimed" => RunStatus::Claimed,
            "running" => RunStatus::Running,
            "succeeded" => RunStatus::Succeeded,
            "failed" => RunStatus::Failed,
            "cancelled" => RunStatus::Cancelled,
            _ => return None,
        })
    }
}

/// Author of an [`AgentMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Authored by the end user.
    User,
    /// Authored by the agent.
    Assistant,
    /// System-level note (e.g. a cancellation notice).
    System,
}

impl MessageRole {
    /// Stable lowercase form stored in the `messages.role` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }

    /// Parse the column form written by [`MessageRole::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            "system" => MessageRole::System,
            _ => return None,
        })
    }
}

/// Status of a [`ToolExecution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolExecutionStatus {
    /// The tool call has started but not finished.
    Started,
    /// The tool call finished (successfully or not — see `error`).
    Finished,
}

impl ToolExecutionStatus {
    /// Stable lowercase form stored in the `tool_executions.status` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ToolExecutionStatus::Started => "started",
            ToolExecutionStatus::Finished => "finished",
        }
    }

    /// Parse the column form written by [`ToolExecutionStatus::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "started" => ToolExecutionStatus::Started,
            "finished" => ToolExecutionStatus::Finished,
            _ => return None,
        })
    }
}

/// Export status for a session's workspace artifact, set from callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceExportStatus {
    /// No export has been produced yet.
    None,
    /// Export is being written by the executor.
    Pending,
    /// Export is available under `workspace_archive_key`.
    Ready,
    /// Export failed; the session keeps running otherwise.
    Failed,
}

impl WorkspaceExportStatus {
    /// Stable lowercase form stored in the `sessions.workspace_export_status` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WorkspaceExportStatus::None => "none",
            WorkspaceExportStatus::Pending => "pending",
            WorkspaceExportStatus::Ready => "ready",
            WorkspaceExportStatus::Failed => "failed",
        }
    }

    /// Parse the column form written by [`WorkspaceExportStatus::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "none" => WorkspaceExportStatus::None,
            "pending" => WorkspaceExportStatus::Pending,
            "ready" => WorkspaceExportStatus::Ready,
            "failed" => WorkspaceExportStatus::Failed,
            _ => return None,
        })
    }
}

/// A grouping of sessions, owned by a single user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Primary key.
    pub id: Uuid,
    /// Owning user.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Soft-delete flag; deleted projects never appear in listings.
    pub is_deleted: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-modified timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A user-scoped container of messages, runs, and workspace state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSession {
    /// Primary key.
    pub id: Uuid,
    /// Owning user.
    pub user_id: String,
    /// Optional parent project.
    pub project_id: Option<Uuid>,
    /// Assigned by the agent runtime after its first step; unique when set.
    pub sdk_session_id: Option<String>,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Layered configuration captured for this session (MCP/skill/input defaults).
    pub config_snapshot: ConfigValue,
    /// Last-known agent state, patched in by `session.state` callbacks.
    pub state_patch: ConfigValue,
    /// Manager-owned prefix for this session's staged workspace, if any.
    pub workspace_prefix: Option<String>,
    /// Object-store key of the workspace file manifest, if exported.
    pub workspace_manifest_key: Option<String>,
    /// Object-store key of the workspace archive, if exported.
    pub workspace_archive_key: Option<String>,
    /// Status of the workspace export.
    pub workspace_export_status: WorkspaceExportStatus,
    /// Soft-delete flag.
    pub is_deleted: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-modified timestamp.
    pub updated_at: DateTime<Utc>,
}

/// One message in a session's transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Primary key (bigserial).
    pub id: i64,
    /// Owning session.
    pub session_id: Uuid,
    /// Who authored this message.
    pub role: MessageRole,
    /// Full structured content (text blocks, tool calls, etc.).
    pub content: ConfigValue,
    /// Short preview text for list views, if derivable.
    pub text_preview: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Structured error recorded on a failed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ConfigValue>,
}

/// One prompt execution attempt within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRun {
    /// Primary key.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// The user message that triggered this run.
    pub user_message_id: i64,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Configuration captured at submission time (pre-resolution).
    pub config_snapshot: ConfigValue,
    /// Opaque token proving a worker currently holds this run.
    pub claim_token: Option<String>,
    /// When the run was claimed.
    pub claimed_at: Option<DateTime<Utc>>,
    /// When the run transitioned to `running`.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// Populated when `status == failed`.
    pub error: Option<RunError>,
    /// Number of claim attempts (incremented on orphan release).
    pub attempt: i32,
    /// Cooperative cancel signal the executor polls for.
    pub cancel_requested: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-modified timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A single tool invocation performed during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    /// Primary key.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// Owning run.
    pub run_id: Uuid,
    /// Tool name (e.g. `"bash"`, `"edit"`).
    pub tool_name: String,
    /// Input payload.
    pub input: ConfigValue,
    /// Output payload, once finished.
    pub output: Option<ConfigValue>,
    /// Error payload, if the tool call failed.
    pub error: Option<ConfigValue>,
    /// When the tool call started.
    pub started_at: DateTime<Utc>,
    /// When the tool call finished, if it has.
    pub finished_at: Option<DateTime<Utc>>,
    /// Current status.
    pub status: ToolExecutionStatus,
}

/// An append-only usage record (per run or per tool call).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLog {
    /// Primary key (bigserial).
    pub id: i64,
    /// Owning run.
    pub run_id: Uuid,
    /// Optional tool execution this usage is attributed to.
    pub tool_execution_id: Option<Uuid>,
    /// Input token count.
    pub input_tokens: i64,
    /// Output token count.
    pub output_tokens: i64,
    /// Estimated cost in USD.
    pub cost_usd: f64,
    /// When this usage was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// A per-user environment variable consumed by the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEnvVar {
    /// Owning user.
    pub user_id: String,
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
}

/// A catalog MCP server template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpPreset {
    /// Primary key.
    pub id: i64,
    /// Template configuration.
    pub config: ConfigValue,
}

/// A catalog skill bundle template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillPreset {
    /// Primary key.
    pub id: i64,
    /// Map of file name to content/descriptor.
    pub entries: ConfigValue,
}

/// Per-user override for a given MCP preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMcpConfig {
    /// Owning user.
    pub user_id: String,
    /// Preset this overrides.
    pub preset_id: i64,
    /// Override map, merged on top of the preset template.
    pub overrides: ConfigValue,
}

/// Record binding an installed skill preset to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSkillInstall {
    /// Owning user.
    pub user_id: String,
    /// Installed preset.
    pub preset_id: i64,
}

/// Discriminant for an [`InputFile`]'s source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFileKind {
    /// `source` is an object-store key.
    File,
    /// `source` is a (GitHub) repository URL.
    Url,
}

impl InputFileKind {
    /// Stable lowercase form used in serialized snapshots.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            InputFileKind::File => "file",
            InputFileKind::Url => "url",
        }
    }
}

/// A descriptor for one input to stage into a run's workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFile {
    /// Caller-assigned identifier (opaque string, e.g. an attachment UUID).
    pub id: String,
    /// Discriminant: object-store key vs. repository URL.
    #[serde(rename = "type")]
    pub kind: InputFileKind,
    /// Display name; defaults to the basename if omitted.
    #[serde(default)]
    pub name: Option<String>,
    /// Object-store key (for `file`) or URL (for `url`).
    pub source: String,
    /// Size in bytes, if known.
    #[serde(default)]
    pub size: Option<i64>,
    /// MIME type, if known.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Explicit relative destination, if the caller wants one.
    #[serde(default)]
    pub target_path: Option<String>,
    /// Staged filesystem path, filled in by the attachment stager.
    #[serde(default)]
    pub path: Option<String>,
    /// Any additional vendor fields, preserved verbatim across resolution.
    #[serde(flatten)]
    pub extra: BTreeMap<String, ConfigValue>,
}
