//! Integration tests for command validation, permissions and audit sinks.

use std::sync::Arc;

use secure_exec_core::{
    AuditContext, AuditEvent, AuditOutcome, AuditSink, ExecutionPermissions, ExecutionRequest,
    ExecutionResult,
};
use secure_exec_governance::{
    check_tool_permission, AuditFilter, BlockedCommandValidator, FileAuditSink,
    InMemoryAuditSink, TracingAuditSink,
};
use serde_json::json;

#[test]
fn test_validator_and_permissions_compose() {
    let validator = BlockedCommandValidator::new();
    let perms = ExecutionPermissions::allow(["shell"]).deny("file-delete");

    assert!(check_tool_permission(&perms, "shell").is_allowed());
    assert!(!check_tool_permission(&perms, "file-delete").is_allowed());

    let report = validator.validate_commands(&[
        "echo hello".to_string(),
        "rm -rf --no-preserve-root /".to_string(),
        ":(){ :|:& };:".to_string(),
    ]);
    assert!(!report.valid);
    assert_eq!(report.blocked.len(), 2);
    assert_eq!(report.blocked[1].blocked.description, "Fork bomb");
}

#[tokio::test]
async fn test_sinks_behind_trait_object() {
    let dir = tempfile::tempdir().unwrap();
    let memory = Arc::new(InMemoryAuditSink::new());
    let sinks: Vec<Arc<dyn AuditSink>> = vec![
        memory.clone(),
        Arc::new(TracingAuditSink),
        Arc::new(FileAuditSink::new(dir.path().join("audit.jsonl"))),
    ];

    let request = ExecutionRequest::new("session-1", "agent-1", "shell", json!({"command": "ls"}));
    let event = AuditEvent::new(
        AuditOutcome::Success,
        AuditContext::for_request(&request),
        "shell",
        "ls",
        ExecutionResult::rejected("n/a"),
    )
    .with_container("abc123def456");

    for sink in &sinks {
        sink.record(event.clone()).await.unwrap();
    }

    let recorded = memory.query(&AuditFilter {
        session_id: Some("session-1".into()),
        outcome: Some(AuditOutcome::Success),
        ..Default::default()
    });
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].container_id.as_deref(), Some("abc123def456"));

    let content = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(parsed["containerId"], "abc123def456");
    assert_eq!(parsed["context"]["sessionId"], "session-1");
}
