// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! cp-core
//!
//! Shared domain types for the agent-execution control plane: the entities
//! persisted by the backend service and the [`value::ConfigValue`] tree that
//! carries loosely-typed configuration between the HTTP boundary, the
//! resolver, and the stager.
//!
//! If you only take one dependency from this workspace, take this one.

/// Domain entities mirroring the tables owned by the backend service.
pub mod entities;
/// The recursive value tree config-related code operates over.
pub mod value;

pub use entities::{
    AgentMessage, AgentRun, AgentSession, InputFile, InputFileKind, McpPreset, MessageRole,
    Project, RunError, RunStatus, SessionStatus, SkillPreset, ToolExecution,
    ToolExecutionStatus, UsageLog, UserEnvVar, UserMcpConfig, UserSkillInstall,
    WorkspaceExportStatus,
};
pub use value::ConfigValue;
