//! Secure executor.
//!
//! Pipeline per request: permission check, command build, blocked-command
//! check, then one ephemeral sandbox. Rejections and sandbox failures are
//! structured `ExecutionResult`s; only unresolvable requests and a missing
//! container runtime escape as `Err`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;

use secure_exec_core::config::{AppConfig, SandboxSettings};
use secure_exec_core::fs_policy::{normalize_absolute_path, workspace_target};
use secure_exec_core::{
    AuditContext, AuditEvent, AuditOutcome, AuditSink, BlockedCommand, ContainerConfig,
    ContainerMount, ExecOptions, ExecutionRequest, ExecutionResult, NetworkMode, ResourceLimits,
    Result, RuntimeType, SecurityOptions,
};
use secure_exec_governance::{
    check_tool_permission, track_container_destroyed, track_execution, BlockedCommandValidator,
};
use secure_exec_sandbox::{ContainerOrchestrator, StopAllReport};

use crate::commands::build_command;

/// Smallest memory limit engines accept. Zero would mean unlimited.
const MIN_MEMORY_BYTES: u64 = 6 * 1024 * 1024;

/// Dry-run outcome of permission and command checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub tool_allowed: bool,
    pub blocked_commands: Vec<BlockedCommand>,
}

/// Runs tool requests inside ephemeral sandboxes.
pub struct SecureExecutor {
    orchestrator: Arc<ContainerOrchestrator>,
    validator: BlockedCommandValidator,
    audit_sink: Option<Arc<dyn AuditSink>>,
    settings: SandboxSettings,
}

impl SecureExecutor {
    /// Create an executor with default sandbox settings and no audit sink.
    pub fn new(orchestrator: Arc<ContainerOrchestrator>) -> Self {
        Self {
            orchestrator,
            validator: BlockedCommandValidator::new(),
            audit_sink: None,
            settings: AppConfig::default().sandbox,
        }
    }

    /// Register the audit sink (at most one).
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    pub fn with_validator(mut self, validator: BlockedCommandValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_settings(mut self, settings: SandboxSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn orchestrator(&self) -> &Arc<ContainerOrchestrator> {
        &self.orchestrator
    }

    /// Execute one request.
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        let started = Instant::now();
        let context = AuditContext::for_request(request);
        let tool = request.tool.as_str();

        tracing::debug!(
            request_id = %context.request_id,
            session_id = %request.session_id,
            agent_id = %request.agent_id,
            tool = %tool,
            "Execution requested"
        );

        // 1. Permission check
        let decision = check_tool_permission(&request.permissions, tool);
        if let Some(reason) = decision.reason() {
            tracing::info!(request_id = %context.request_id, tool = %tool, reason = %reason, "Tool denied");
            let result = ExecutionResult::rejected(reason);
            self.finish(AuditEvent::new(
                AuditOutcome::Failure,
                context,
                tool,
                "",
                result.clone(),
            ))
            .await;
            return Ok(result);
        }

        // 2. Command build. An unresolvable request is a caller fault.
        let command = build_command(tool, &request.args)?;

        // 3. Blocked-command check
        if let Some(blocked) = self.validator.is_command_blocked(&command) {
            tracing::warn!(
                request_id = %context.request_id,
                tool = %tool,
                description = %blocked.description,
                "Command blocked"
            );
            let result =
                ExecutionResult::rejected(format!("Command blocked by security policy: {}", blocked));
            self.finish(
                AuditEvent::new(AuditOutcome::Blocked, context, tool, command, result.clone())
                    .with_blocked_command(blocked),
            )
            .await;
            return Ok(result);
        }

        // 4. Sandboxed execution
        self.orchestrator.initialize().await?;
        let runtime = self
            .orchestrator
            .runtime_type()
            .await
            .unwrap_or(RuntimeType::Docker);

        let container_id = ContainerOrchestrator::generate_container_id();
        let config = self.build_container_config(request, &container_id, runtime);

        let created = self.orchestrator.create_container(&config).await;
        let result = match &created {
            Ok(_) => {
                let shell = vec!["sh".to_string(), "-c".to_string(), command.clone()];
                let options = ExecOptions::default()
                    .with_timeout(request.permissions.execution_timeout())
                    .with_working_dir(self.settings.workspace_prefix.clone());
                let output = self
                    .orchestrator
                    .exec_in_container(&container_id, &shell, &options)
                    .await;
                ExecutionResult::from_exec(&output, started.elapsed())
            }
            Err(e) => {
                tracing::warn!(container_id = %container_id, error = %e, "Sandbox creation failed");
                ExecutionResult::failure(e.to_string(), started.elapsed())
            }
        };

        // Always torn down, whatever happened above.
        self.orchestrator
            .destroy_container(&container_id, false)
            .await;
        if created.is_ok() {
            track_container_destroyed(false);
        }

        let outcome = if result.success {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };
        tracing::info!(
            request_id = %context.request_id,
            container_id = %container_id,
            tool = %tool,
            outcome = %outcome,
            execution_time_ms = result.execution_time,
            "Execution finished"
        );
        self.finish(
            AuditEvent::new(outcome, context, tool, command, result.clone())
                .with_container(container_id),
        )
        .await;

        Ok(result)
    }

    /// Permission and command checks only. Never creates a container.
    pub fn validate(&self, request: &ExecutionRequest) -> Result<ValidationReport> {
        let tool_allowed = check_tool_permission(&request.permissions, &request.tool).is_allowed();
        let command = match build_command(&request.tool, &request.args) {
            Ok(command) => command,
            // `execute` rejects a denied tool before building its command.
            Err(_) if !tool_allowed => {
                return Ok(ValidationReport {
                    valid: false,
                    tool_allowed,
                    blocked_commands: Vec::new(),
                })
            }
            Err(e) => return Err(e),
        };
        let blocked_commands: Vec<BlockedCommand> = self
            .validator
            .validate_commands(&[command])
            .blocked
            .into_iter()
            .map(|m| m.blocked)
            .collect();

        Ok(ValidationReport {
            valid: tool_allowed && blocked_commands.is_empty(),
            tool_allowed,
            blocked_commands,
        })
    }

    /// Sandbox configuration for `request`.
    ///
    /// Allowed paths become read-write binds under the workspace prefix;
    /// blocked paths are shadowed by an empty read-only tmpfs. Paths that
    /// are not absolute are skipped.
    pub fn build_container_config(
        &self,
        request: &ExecutionRequest,
        container_id: &str,
        runtime: RuntimeType,
    ) -> ContainerConfig {
        let permissions = &request.permissions;
        let settings = &self.settings;

        let memory_bytes = if permissions.max_memory < MIN_MEMORY_BYTES {
            tracing::warn!(
                requested = permissions.max_memory,
                applied = settings.default_memory_bytes,
                "Memory limit too small, using configured default"
            );
            settings.default_memory_bytes
        } else {
            permissions.max_memory
        };

        let resources = ResourceLimits {
            memory_bytes,
            cpus: settings.default_cpus,
            timeout: permissions.execution_timeout(),
            pids_limit: settings.pids_limit,
        };
        let security = SecurityOptions {
            seccomp_profile: settings.seccomp_profile.clone(),
            ..SecurityOptions::default()
        };
        let network = if permissions.network_access {
            NetworkMode::Bridge
        } else {
            NetworkMode::None
        };

        let mut config = ContainerConfig::new(
            container_id,
            &request.session_id,
            &request.agent_id,
            runtime,
            &settings.image,
        )
        .with_resources(resources)
        .with_network(network)
        .with_security(security);

        for path in &permissions.allowed_paths {
            let mount = normalize_absolute_path(path).and_then(|source| {
                let target = workspace_target(&settings.workspace_prefix, &source)?;
                Ok(ContainerMount::bind(source, target, false))
            });
            match mount {
                Ok(mount) => config = config.with_mount(mount),
                Err(e) => tracing::warn!(path = %path, error = %e, "Skipping allowed path"),
            }
        }

        for path in &permissions.blocked_paths {
            match normalize_absolute_path(path) {
                Ok(target) => config = config.with_mount(ContainerMount::tmpfs(target, true)),
                Err(e) => tracing::warn!(path = %path, error = %e, "Skipping blocked path"),
            }
        }

        config
    }

    /// Force-destroy every sandbox still alive.
    pub async fn stop_all(&self) -> StopAllReport {
        let report = self.orchestrator.stop_all().await;
        for _ in &report.stopped {
            track_container_destroyed(true);
        }
        report
    }

    /// Record metrics and emit the audit event. Sink failures are logged only.
    async fn finish(&self, event: AuditEvent) {
        let elapsed = event.result.execution_time as f64 / 1000.0;
        track_execution(&event.tool, event.outcome, elapsed);

        if let Some(sink) = &self.audit_sink {
            let request_id = event.context.request_id.clone();
            if let Err(e) = sink.record(event).await {
                tracing::error!(request_id = %request_id, error = %e, "Failed to record audit event");
            }
        }
    }
}
