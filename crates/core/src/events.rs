use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{BlockedCommand, ExecutionRequest, ExecutionResult};

/// Event type tag carried by every audit record.
pub const SECURE_EXECUTION_EVENT: &str = "secure-execution";

/// How a request was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    Blocked,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "failure",
            AuditOutcome::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correlation data for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditContext {
    pub session_id: String,
    pub agent_id: String,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditContext {
    /// Build a context with a fresh request id.
    pub fn for_request(request: &ExecutionRequest) -> Self {
        Self {
            session_id: request.session_id.clone(),
            agent_id: request.agent_id.clone(),
            request_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Immutable record of how one request was handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Always `secure-execution`.
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: AuditOutcome,
    pub context: AuditContext,
    pub tool: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_command: Option<BlockedCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    pub result: ExecutionResult,
}

impl AuditEvent {
    pub fn new(
        outcome: AuditOutcome,
        context: AuditContext,
        tool: impl Into<String>,
        command: impl Into<String>,
        result: ExecutionResult,
    ) -> Self {
        Self {
            event_type: SECURE_EXECUTION_EVENT.to_string(),
            timestamp: Utc::now(),
            outcome,
            context,
            tool: tool.into(),
            command: command.into(),
            blocked_command: None,
            container_id: None,
            result,
        }
    }

    pub fn with_blocked_command(mut self, blocked: BlockedCommand) -> Self {
        self.blocked_command = Some(blocked);
        self
    }

    pub fn with_container(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }
}
