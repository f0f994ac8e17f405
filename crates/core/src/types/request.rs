use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Request Types
// =============================================================================

/// Wildcard entry in `allow_tools` / `deny_tools`.
pub const TOOL_WILDCARD: &str = "*";

/// Default memory cap for one sandbox (512 MiB).
pub const DEFAULT_MAX_MEMORY_BYTES: u64 = 512 * 1024 * 1024;

/// Default execution time cap in milliseconds.
pub const DEFAULT_MAX_EXECUTION_TIME_MS: u64 = 30_000;

/// One tool invocation to run inside a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    /// Session the agent is running in.
    pub session_id: String,

    /// Agent that issued the request.
    pub agent_id: String,

    /// Tool name (e.g. `file-read`, `shell`).
    pub tool: String,

    /// Arbitrary tool arguments.
    #[serde(default)]
    pub args: serde_json::Value,

    /// Policy scoping this request.
    #[serde(default)]
    pub permissions: ExecutionPermissions,
}

impl ExecutionRequest {
    /// Create a request with default (deny-all) permissions.
    pub fn new(
        session_id: impl Into<String>,
        agent_id: impl Into<String>,
        tool: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            agent_id: agent_id.into(),
            tool: tool.into(),
            args,
            permissions: ExecutionPermissions::default(),
        }
    }

    /// Replace the permissions.
    pub fn with_permissions(mut self, permissions: ExecutionPermissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// String argument lookup.
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(|v| v.as_str())
    }
}

/// Permission policy for a single request.
///
/// An empty `allow_tools` list allows nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionPermissions {
    pub allow_tools: Vec<String>,
    pub deny_tools: Vec<String>,
    /// Host paths mounted read-write under the workspace prefix.
    pub allowed_paths: Vec<String>,
    /// Container paths shadowed by an empty read-only tmpfs.
    pub blocked_paths: Vec<String>,
    /// Memory cap in bytes.
    pub max_memory: u64,
    /// Execution time cap in milliseconds.
    pub max_execution_time: u64,
    pub network_access: bool,
}

impl Default for ExecutionPermissions {
    fn default() -> Self {
        Self {
            allow_tools: Vec::new(),
            deny_tools: Vec::new(),
            allowed_paths: Vec::new(),
            blocked_paths: Vec::new(),
            max_memory: DEFAULT_MAX_MEMORY_BYTES,
            max_execution_time: DEFAULT_MAX_EXECUTION_TIME_MS,
            network_access: false,
        }
    }
}

impl ExecutionPermissions {
    /// Permissions allowing every tool.
    pub fn allow_all() -> Self {
        Self {
            allow_tools: vec![TOOL_WILDCARD.to_string()],
            ..Default::default()
        }
    }

    /// Permissions allowing the given tools only.
    pub fn allow<I, S>(tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow_tools: tools.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn deny(mut self, tool: impl Into<String>) -> Self {
        self.deny_tools.push(tool.into());
        self
    }

    pub fn with_allowed_path(mut self, path: impl Into<String>) -> Self {
        self.allowed_paths.push(path.into());
        self
    }

    pub fn with_blocked_path(mut self, path: impl Into<String>) -> Self {
        self.blocked_paths.push(path.into());
        self
    }

    pub fn with_max_memory(mut self, bytes: u64) -> Self {
        self.max_memory = bytes;
        self
    }

    pub fn with_max_execution_time(mut self, timeout: Duration) -> Self {
        self.max_execution_time = timeout.as_millis() as u64;
        self
    }

    pub fn with_network_access(mut self, enabled: bool) -> Self {
        self.network_access = enabled;
        self
    }

    /// Execution time cap as a `Duration`.
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.max_execution_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_permissions_default_deny_all() {
        let perms = ExecutionPermissions::default();
        assert!(perms.allow_tools.is_empty());
        assert_eq!(perms.max_memory, DEFAULT_MAX_MEMORY_BYTES);
        assert_eq!(perms.execution_timeout(), Duration::from_secs(30));
        assert!(!perms.network_access);
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let request: ExecutionRequest = serde_json::from_value(json!({
            "sessionId": "s-1",
            "agentId": "a-1",
            "tool": "file-read",
            "args": { "path": "/etc/hosts" },
            "permissions": {
                "allowTools": ["file-read"],
                "blockedPaths": ["/etc"],
                "maxExecutionTime": 5000
            }
        }))
        .unwrap();

        assert_eq!(request.session_id, "s-1");
        assert_eq!(request.arg_str("path"), Some("/etc/hosts"));
        assert_eq!(request.permissions.allow_tools, vec!["file-read"]);
        assert_eq!(request.permissions.blocked_paths, vec!["/etc"]);
        assert_eq!(request.permissions.execution_timeout(), Duration::from_secs(5));
        // Unspecified fields fall back to defaults
        assert_eq!(request.permissions.max_memory, DEFAULT_MAX_MEMORY_BYTES);
    }
}
