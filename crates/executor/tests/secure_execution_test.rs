//! Secure executor integration tests.
//!
//! Full pipeline against `MockRuntime`: permission → command build →
//! blocked-command check → sandbox → audit. No container engine required.

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use secure_exec_core::{
    AuditEvent, AuditOutcome, AuditSink, Error, ExecOutput, ExecutionPermissions,
    ExecutionRequest, MountType, Result,
};
use secure_exec_executor::SecureExecutor;
use secure_exec_governance::InMemoryAuditSink;
use secure_exec_sandbox::{ContainerOrchestrator, MockProcessRunner, MockRuntime};

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    runtime: Arc<MockRuntime>,
    audit: Arc<InMemoryAuditSink>,
    executor: SecureExecutor,
}

fn harness() -> Harness {
    let runtime = Arc::new(MockRuntime::new());
    let audit = Arc::new(InMemoryAuditSink::new());
    let orchestrator = Arc::new(ContainerOrchestrator::with_runtime(runtime.clone()));
    let executor = SecureExecutor::new(orchestrator).with_audit_sink(audit.clone());
    Harness {
        runtime,
        audit,
        executor,
    }
}

fn shell(command: &str, permissions: ExecutionPermissions) -> ExecutionRequest {
    ExecutionRequest::new("session-1", "agent-1", "shell", json!({ "command": command }))
        .with_permissions(permissions)
}

struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn record(&self, _event: AuditEvent) -> Result<()> {
        Err(Error::audit("sink offline"))
    }
}

// =============================================================================
// 1. Permission layer
// =============================================================================

#[tokio::test]
async fn test_denied_tool_never_creates_container() {
    let h = harness();
    let request = shell("ls", ExecutionPermissions::allow_all().deny("shell"));

    let result = h.executor.execute(&request).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.execution_time, 0);
    assert!(result.error.unwrap().contains("explicitly denied"));
    assert!(h.runtime.created().is_empty());

    let events = h.audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, AuditOutcome::Failure);
    assert!(events[0].container_id.is_none());
}

#[tokio::test]
async fn test_tool_missing_from_allow_list() {
    let h = harness();
    let request = shell("ls", ExecutionPermissions::allow(["file-read"]));

    let result = h.executor.execute(&request).await.unwrap();

    assert!(!result.success);
    assert!(h.runtime.created().is_empty());
}

#[tokio::test]
async fn test_wildcard_allows_any_tool() {
    let h = harness();
    h.runtime.push_exec_output(ExecOutput {
        exit_code: 0,
        stdout: "hello\n".into(),
        stderr: String::new(),
        execution_time: Duration::from_millis(3),
        timed_out: false,
    });

    let result = h
        .executor
        .execute(&shell("echo hello", ExecutionPermissions::allow_all()))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.output.as_deref(), Some("hello\n"));

    let execs = h.runtime.execs();
    assert_eq!(execs.len(), 1);
    assert_eq!(execs[0].1, vec!["sh", "-c", "echo hello"]);
    assert_eq!(execs[0].2.working_dir.as_deref(), Some("/workspace"));
    assert_eq!(execs[0].2.timeout, Some(Duration::from_secs(30)));
}

#[tokio::test]
async fn test_validate_and_execute_agree_on_denied_unknown_tool() {
    let h = harness();
    let request = ExecutionRequest::new("session-1", "agent-1", "teleport", json!({ "to": "mars" }))
        .with_permissions(ExecutionPermissions::allow(["shell"]));

    let report = h.executor.validate(&request).unwrap();
    let result = h.executor.execute(&request).await.unwrap();

    assert!(!report.valid);
    assert!(!result.success);
    assert!(h.runtime.created().is_empty());
}

// =============================================================================
// 2. Blocked-command layer
// =============================================================================

#[tokio::test]
async fn test_blocked_command_is_audited_without_container() {
    let h = harness();
    let request = shell("rm -rf --no-preserve-root /", ExecutionPermissions::allow_all());

    let result = h.executor.execute(&request).await.unwrap();

    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.contains("Recursive delete of the root filesystem"));
    assert!(h.runtime.created().is_empty());

    let events = h.audit.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.outcome, AuditOutcome::Blocked);
    assert!(event.container_id.is_none());
    assert_eq!(event.command, "rm -rf --no-preserve-root /");
    let blocked = event.blocked_command.as_ref().unwrap();
    assert_eq!(blocked.description, "Recursive delete of the root filesystem");
}

#[tokio::test]
async fn test_file_delete_of_root_is_blocked() {
    let h = harness();
    let request = ExecutionRequest::new(
        "session-1",
        "agent-1",
        "file-delete",
        json!({ "path": "/", "recursive": true }),
    )
    .with_permissions(ExecutionPermissions::allow_all());

    let result = h.executor.execute(&request).await.unwrap();
    assert!(!result.success);
    assert!(h.runtime.created().is_empty());
}

// =============================================================================
// 3. Sandbox layer
// =============================================================================

#[tokio::test]
async fn test_read_of_blocked_path_relies_on_mounts() {
    let h = harness();
    let request = ExecutionRequest::new(
        "session-1",
        "agent-1",
        "file-read",
        json!({ "path": "/etc/passwd" }),
    )
    .with_permissions(
        ExecutionPermissions::allow(["file-read"])
            .with_allowed_path("/data")
            .with_blocked_path("/etc"),
    );

    let result = h.executor.execute(&request).await.unwrap();
    assert!(result.success);

    let created = h.runtime.created();
    assert_eq!(created.len(), 1);
    let mounts = &created[0].mounts;

    let bind = mounts.iter().find(|m| m.kind == MountType::Bind).unwrap();
    assert_eq!(bind.source, "/data");
    assert_eq!(bind.target, "/workspace/data");
    assert!(!bind.read_only);

    let tmpfs = mounts.iter().find(|m| m.kind == MountType::Tmpfs).unwrap();
    assert_eq!(tmpfs.target, "/etc");
    assert!(tmpfs.read_only);

    assert_eq!(h.runtime.execs()[0].1[2], "cat \"/etc/passwd\"");
}

#[tokio::test]
async fn test_container_destroyed_after_success_and_failure() {
    let h = harness();
    h.runtime.push_exec_output(ExecOutput {
        exit_code: 2,
        stdout: String::new(),
        stderr: "ls: cannot access 'missing': No such file or directory".into(),
        execution_time: Duration::from_millis(1),
        timed_out: false,
    });

    let failed = h
        .executor
        .execute(&shell("ls missing", ExecutionPermissions::allow_all()))
        .await
        .unwrap();
    let ok = h
        .executor
        .execute(&shell("true", ExecutionPermissions::allow_all()))
        .await
        .unwrap();

    assert!(!failed.success);
    assert!(failed.error.unwrap().contains("No such file"));
    assert!(ok.success);
    assert_eq!(h.runtime.removed().len(), 2);
    assert!(h.runtime.live_containers().is_empty());
    assert!(h.executor.orchestrator().active_containers().is_empty());

    let events = h.audit.events();
    assert_eq!(events[0].outcome, AuditOutcome::Failure);
    assert_eq!(events[1].outcome, AuditOutcome::Success);
    assert!(events.iter().all(|e| e.container_id.is_some()));
}

#[tokio::test]
async fn test_create_failure_is_a_structured_result() {
    let h = harness();
    h.runtime.fail_create("image not found");

    let result = h
        .executor
        .execute(&shell("ls", ExecutionPermissions::allow_all()))
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.error.unwrap().contains("image not found"));
    assert!(h.runtime.execs().is_empty());
    assert!(h.executor.orchestrator().active_containers().is_empty());
    assert_eq!(h.audit.events()[0].outcome, AuditOutcome::Failure);
}

#[test]
fn test_failed_create_is_not_counted_as_destroyed() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let failing = harness();
            failing.runtime.fail_create("image not found");
            failing
                .executor
                .execute(&shell("ls", ExecutionPermissions::allow_all()))
                .await
                .unwrap();

            let working = harness();
            working
                .executor
                .execute(&shell("ls", ExecutionPermissions::allow_all()))
                .await
                .unwrap();
        });
    });

    let rendered = handle.render();
    assert!(
        rendered.contains("secure_exec_containers_destroyed_total{forced=\"false\"} 1\n"),
        "unexpected metrics:\n{rendered}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_exec_timeout_yields_failed_result() {
    let h = harness();
    h.runtime.set_exec_delay(Duration::from_secs(3600));
    let permissions =
        ExecutionPermissions::allow_all().with_max_execution_time(Duration::from_secs(2));

    let result = h
        .executor
        .execute(&shell("sleep 3600", permissions))
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.error.unwrap().contains("timed out"));
    assert!(h.runtime.live_containers().is_empty());
}

#[tokio::test]
async fn test_zero_memory_limit_never_means_unlimited() {
    let h = harness();
    h.executor
        .execute(&shell("true", ExecutionPermissions::allow_all().with_max_memory(0)))
        .await
        .unwrap();

    let created = h.runtime.created();
    assert_eq!(created[0].resources.memory_bytes, 512 * 1024 * 1024);
}

#[tokio::test]
async fn test_each_request_gets_a_fresh_container() {
    let h = harness();
    for _ in 0..2 {
        h.executor
            .execute(&shell("true", ExecutionPermissions::allow_all()))
            .await
            .unwrap();
    }

    let created = h.runtime.created();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].container_id.len(), 12);
    assert_ne!(created[0].container_id, created[1].container_id);
    assert_eq!(created[0].session_id, "session-1");
    assert_eq!(created[0].agent_id, "agent-1");
    assert_eq!(h.runtime.stopped().len(), 2);
}

// =============================================================================
// 4. Errors and auditing
// =============================================================================

#[tokio::test]
async fn test_unknown_tool_is_an_error() {
    let h = harness();
    let request = ExecutionRequest::new("session-1", "agent-1", "teleport", json!({ "to": "mars" }))
        .with_permissions(ExecutionPermissions::allow_all());

    let err = h.executor.execute(&request).await.unwrap_err();
    assert!(matches!(err, Error::UnknownTool(ref tool) if tool == "teleport"));
    assert!(err.is_configuration_fault());
    assert!(h.runtime.created().is_empty());
}

#[tokio::test]
async fn test_unmapped_tool_falls_back_to_command() {
    let h = harness();
    let request = ExecutionRequest::new(
        "session-1",
        "agent-1",
        "python",
        json!({ "command": "python3 -c 'print(1)'" }),
    )
    .with_permissions(ExecutionPermissions::allow(["python"]));

    let result = h.executor.execute(&request).await.unwrap();
    assert!(result.success);
    assert_eq!(h.runtime.execs()[0].1[2], "python3 -c 'print(1)'");
}

#[tokio::test]
async fn test_audit_failure_never_fails_execution() {
    let runtime = Arc::new(MockRuntime::new());
    let orchestrator = Arc::new(ContainerOrchestrator::with_runtime(runtime.clone()));
    let executor = SecureExecutor::new(orchestrator).with_audit_sink(Arc::new(FailingAuditSink));

    let result = executor
        .execute(&shell("true", ExecutionPermissions::allow_all()))
        .await
        .unwrap();
    assert!(result.success);

    let blocked = executor
        .execute(&shell("sudo true", ExecutionPermissions::allow_all()))
        .await
        .unwrap();
    assert!(!blocked.success);
}

#[tokio::test]
async fn test_missing_runtime_is_an_error() {
    let runner = Arc::new(MockProcessRunner::new());
    for program in ["docker", "podman", "container"] {
        runner.set_unavailable(program);
    }
    let executor = SecureExecutor::new(Arc::new(ContainerOrchestrator::new(runner)));

    let err = executor
        .execute(&shell("ls", ExecutionPermissions::allow_all()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RuntimeUnavailable(_)));

    // Rejections never need a runtime.
    let denied = executor
        .execute(&shell("ls", ExecutionPermissions::default()))
        .await
        .unwrap();
    assert!(!denied.success);
}

#[tokio::test]
async fn test_stop_all_after_requests() {
    let h = harness();
    h.executor
        .execute(&shell("true", ExecutionPermissions::allow_all()))
        .await
        .unwrap();

    let report = h.executor.stop_all().await;
    assert!(report.is_clean());
    assert!(report.stopped.is_empty());
}
