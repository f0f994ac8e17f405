//! Tool permission checks against a request's `ExecutionPermissions`.

use serde::{Deserialize, Serialize};

use secure_exec_core::types::{ExecutionPermissions, TOOL_WILDCARD};

/// Decision for one tool against one permission set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionDecision {
    Allowed,
    Denied(String),
}

impl PermissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PermissionDecision::Allowed)
    }

    /// Denial reason, if denied.
    pub fn reason(&self) -> Option<&str> {
        match self {
            PermissionDecision::Allowed => None,
            PermissionDecision::Denied(reason) => Some(reason),
        }
    }
}

fn list_matches(list: &[String], tool: &str) -> bool {
    list.iter().any(|entry| entry == TOOL_WILDCARD || entry == tool)
}

/// Check whether `tool` may run under `permissions`.
///
/// The deny list wins over the allow list. Both lists match the wildcard
/// or a literal tool name, so a wildcard on the deny list denies every
/// tool. Anything the allow list does not match is denied.
pub fn check_tool_permission(permissions: &ExecutionPermissions, tool: &str) -> PermissionDecision {
    if list_matches(&permissions.deny_tools, tool) {
        tracing::debug!(tool = tool, "Tool is on the deny list");
        return PermissionDecision::Denied(format!("Tool '{}' is explicitly denied", tool));
    }

    if list_matches(&permissions.allow_tools, tool) {
        return PermissionDecision::Allowed;
    }

    tracing::debug!(tool = tool, "Tool is not on the allow list");
    PermissionDecision::Denied(format!("Tool '{}' is not in the allowed tools list", tool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_allows_everything() {
        let perms = ExecutionPermissions::allow_all();
        for tool in ["shell", "file-read", "anything-else"] {
            assert!(check_tool_permission(&perms, tool).is_allowed());
        }
    }

    #[test]
    fn test_literal_allow() {
        let perms = ExecutionPermissions::allow(["file-read"]);
        assert!(check_tool_permission(&perms, "file-read").is_allowed());
        let denied = check_tool_permission(&perms, "shell");
        assert!(!denied.is_allowed());
        assert!(denied.reason().unwrap().contains("not in the allowed"));
    }

    #[test]
    fn test_deny_takes_precedence() {
        let perms = ExecutionPermissions::allow_all().deny("shell");
        let decision = check_tool_permission(&perms, "shell");
        assert!(!decision.is_allowed());
        assert!(decision.reason().unwrap().contains("explicitly denied"));
        assert!(check_tool_permission(&perms, "file-read").is_allowed());
    }

    #[test]
    fn test_wildcard_deny_blocks_all() {
        let perms = ExecutionPermissions::allow(["shell"]).deny("*");
        assert!(!check_tool_permission(&perms, "shell").is_allowed());
    }

    #[test]
    fn test_empty_permissions_deny() {
        let perms = ExecutionPermissions::default();
        assert!(!check_tool_permission(&perms, "shell").is_allowed());
    }
}
