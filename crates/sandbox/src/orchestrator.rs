//! Container orchestration.
//!
//! The orchestrator owns the selected runtime and a registry of the
//! containers it created. Teardown never fails: errors are logged and the
//! registry entry is evicted regardless.

use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use secure_exec_core::{
    ContainerConfig, ContainerStatus, Error, ExecOptions, ExecOutput, Result, RuntimeType,
};

use crate::detector::RuntimeDetector;
use crate::process::{ProcessRunner, TokioProcessRunner};
use crate::runtime::{create_runtime, ContainerRuntime, DEFAULT_NAME_PREFIX};

/// Grace period for the stop phase of teardown.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Outcome of a forced teardown of every tracked container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopAllReport {
    pub stopped: Vec<String>,
    /// `(container_id, error message)` for every failed removal.
    pub failed: Vec<(String, String)>,
}

impl StopAllReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Owns one container runtime and tracks active sandboxes.
pub struct ContainerOrchestrator {
    runner: Arc<dyn ProcessRunner>,
    preferred: Option<RuntimeType>,
    runtime: tokio::sync::RwLock<Option<Arc<dyn ContainerRuntime>>>,
    containers: DashMap<String, ContainerStatus>,
    stop_grace: Duration,
    name_prefix: String,
}

impl ContainerOrchestrator {
    /// Create an orchestrator that detects its runtime on `initialize()`.
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            preferred: None,
            runtime: tokio::sync::RwLock::new(None),
            containers: DashMap::new(),
            stop_grace: DEFAULT_STOP_GRACE,
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
        }
    }

    /// Create an orchestrator around an already selected runtime.
    pub fn with_runtime(runtime: Arc<dyn ContainerRuntime>) -> Self {
        let orchestrator = Self::new(Arc::new(TokioProcessRunner));
        Self {
            runtime: tokio::sync::RwLock::new(Some(runtime)),
            ..orchestrator
        }
    }

    pub fn with_preferred_runtime(mut self, preferred: Option<RuntimeType>) -> Self {
        self.preferred = preferred;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Select the runtime. Idempotent.
    pub async fn initialize(&self) -> Result<()> {
        // Fast path: already initialized
        if self.runtime.read().await.is_some() {
            return Ok(());
        }

        let mut guard = self.runtime.write().await;
        // Double-check after acquiring write lock
        if guard.is_some() {
            return Ok(());
        }

        let detected = RuntimeDetector::new(self.runner.clone())
            .with_preferred(self.preferred)
            .detect()
            .await
            .ok_or_else(|| {
                Error::runtime_unavailable(
                    "No container runtime found. Install Docker or Podman to run sandboxed commands.",
                )
            })?;

        let runtime = create_runtime(detected, self.runner.clone(), &self.name_prefix)?;
        tracing::info!(runtime = %detected, "Container orchestrator initialized");
        *guard = Some(runtime);
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.runtime.read().await.is_some()
    }

    /// Engine of the selected runtime.
    pub async fn runtime_type(&self) -> Option<RuntimeType> {
        self.runtime.read().await.as_ref().map(|r| r.runtime_type())
    }

    async fn runtime(&self) -> Result<Arc<dyn ContainerRuntime>> {
        self.runtime.read().await.clone().ok_or_else(|| {
            Error::runtime_unavailable("Container orchestrator is not initialized")
        })
    }

    /// Short unique container id: 12 hex characters of a v4 UUID.
    pub fn generate_container_id() -> String {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(12);
        id
    }

    /// Create a container and track it.
    pub async fn create_container(&self, config: &ContainerConfig) -> Result<ContainerStatus> {
        let runtime = self.runtime().await?;
        let status = runtime.create_container(config).await?;
        self.containers
            .insert(config.container_id.clone(), status.clone());
        tracing::debug!(
            container_id = %config.container_id,
            active = self.containers.len(),
            "Container registered"
        );
        Ok(status)
    }

    /// Run a command in a tracked container.
    ///
    /// `options.timeout` is enforced here as well, so a runtime that overruns
    /// still yields a timed-out output. Runtime errors become failed outputs.
    pub async fn exec_in_container(
        &self,
        container_id: &str,
        command: &[String],
        options: &ExecOptions,
    ) -> ExecOutput {
        let started = Instant::now();
        let runtime = match self.runtime().await {
            Ok(runtime) => runtime,
            Err(e) => return ExecOutput::failed(e.to_string(), started.elapsed()),
        };

        let exec = runtime.exec_in_container(container_id, command, options);
        let result = match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, exec).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(container_id = %container_id, timeout = ?limit, "Exec deadline exceeded");
                    return ExecOutput::timeout(limit, String::new(), String::new());
                }
            },
            None => exec.await,
        };

        result.unwrap_or_else(|e| {
            tracing::warn!(container_id = %container_id, error = %e, "Exec failed");
            ExecOutput::failed(e.to_string(), started.elapsed())
        })
    }

    async fn teardown(&self, container_id: &str, force: bool) -> Result<()> {
        let result = match self.runtime().await {
            Ok(runtime) => {
                if !force {
                    if let Err(e) = runtime.stop_container(container_id, self.stop_grace).await {
                        tracing::warn!(container_id = %container_id, error = %e, "Failed to stop container");
                    }
                }
                runtime.remove_container(container_id, true).await
            }
            Err(e) => Err(e),
        };
        self.containers.remove(container_id);
        result
    }

    /// Stop (unless `force`) and remove a container, then stop tracking it.
    ///
    /// Never fails and is safe to call twice.
    pub async fn destroy_container(&self, container_id: &str, force: bool) {
        match self.teardown(container_id, force).await {
            Ok(()) => tracing::debug!(container_id = %container_id, force, "Container destroyed"),
            Err(e) => {
                tracing::warn!(container_id = %container_id, error = %e, "Container cleanup failed")
            }
        }
    }

    /// Refresh and return a container's status.
    pub async fn get_container_status(&self, container_id: &str) -> Result<ContainerStatus> {
        let runtime = self.runtime().await?;
        let status = runtime.get_container_status(container_id).await?;
        if let Some(mut entry) = self.containers.get_mut(container_id) {
            *entry = status.clone();
        }
        Ok(status)
    }

    pub async fn get_container_logs(&self, container_id: &str, tail: Option<usize>) -> Result<String> {
        self.runtime().await?.get_container_logs(container_id, tail).await
    }

    /// Managed containers known to the engine, including untracked ones.
    pub async fn list_containers(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ContainerStatus>> {
        self.runtime().await?.list_containers(labels).await
    }

    /// Ids of tracked containers.
    pub fn active_containers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.containers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Gracefully destroy every tracked container in parallel.
    pub async fn cleanup(&self) {
        let ids = self.active_containers();
        if ids.is_empty() {
            return;
        }
        tracing::info!(count = ids.len(), "Cleaning up sandbox containers");
        join_all(ids.iter().map(|id| self.destroy_container(id, false))).await;
        self.containers.clear();
    }

    /// Force-destroy every tracked container in parallel.
    pub async fn stop_all(&self) -> StopAllReport {
        let ids = self.active_containers();
        let results = join_all(ids.iter().map(|id| self.teardown(id, true))).await;
        self.containers.clear();

        let mut report = StopAllReport::default();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(()) => report.stopped.push(id),
                Err(e) => {
                    tracing::warn!(container_id = %id, error = %e, "Forced teardown failed");
                    report.failed.push((id, e.to_string()));
                }
            }
        }
        if !report.stopped.is_empty() || !report.failed.is_empty() {
            tracing::info!(
                stopped = report.stopped.len(),
                failed = report.failed.len(),
                "Stopped all sandbox containers"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRuntime;

    fn config(id: &str) -> ContainerConfig {
        ContainerConfig::new(id, "s1", "a1", RuntimeType::Docker, "img")
    }

    #[test]
    fn test_generate_container_id() {
        let a = ContainerOrchestrator::generate_container_id();
        let b = ContainerOrchestrator::generate_container_id();
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_create_registers_and_destroy_evicts() {
        let runtime = Arc::new(MockRuntime::new());
        let orchestrator = ContainerOrchestrator::with_runtime(runtime.clone());

        orchestrator.create_container(&config("c1")).await.unwrap();
        assert_eq!(orchestrator.active_containers(), vec!["c1"]);

        orchestrator.destroy_container("c1", false).await;
        assert!(orchestrator.active_containers().is_empty());
        assert_eq!(runtime.stopped(), vec!["c1"]);
        assert_eq!(runtime.removed(), vec!["c1"]);
    }

    #[tokio::test]
    async fn test_forced_destroy_skips_stop() {
        let runtime = Arc::new(MockRuntime::new());
        let orchestrator = ContainerOrchestrator::with_runtime(runtime.clone());
        orchestrator.create_container(&config("c1")).await.unwrap();

        orchestrator.destroy_container("c1", true).await;
        assert!(runtime.stopped().is_empty());
        assert_eq!(runtime.removed(), vec!["c1"]);
    }

    #[tokio::test]
    async fn test_failed_create_is_not_tracked() {
        let runtime = Arc::new(MockRuntime::new());
        runtime.fail_create("no space left on device");
        let orchestrator = ContainerOrchestrator::with_runtime(runtime);

        let result = orchestrator.create_container(&config("c1")).await;
        assert!(matches!(result, Err(Error::ContainerCreate(_))));
        assert!(orchestrator.active_containers().is_empty());
    }

    #[tokio::test]
    async fn test_exec_error_becomes_failed_output() {
        let runtime = Arc::new(MockRuntime::new());
        runtime.fail_exec("engine went away");
        let orchestrator = ContainerOrchestrator::with_runtime(runtime);

        let output = orchestrator
            .exec_in_container("c1", &["true".to_string()], &ExecOptions::default())
            .await;
        assert_eq!(output.exit_code, -1);
        assert!(output.stderr.contains("engine went away"));
    }

    #[tokio::test]
    async fn test_operations_before_initialize() {
        let runner = Arc::new(crate::process::MockProcessRunner::new());
        let orchestrator = ContainerOrchestrator::new(runner);
        assert!(!orchestrator.is_initialized().await);

        let result = orchestrator.create_container(&config("c1")).await;
        assert!(matches!(result, Err(Error::RuntimeUnavailable(_))));
        // Teardown stays infallible.
        orchestrator.destroy_container("c1", false).await;
    }

    #[tokio::test]
    async fn test_status_refreshes_registry() {
        let runtime = Arc::new(MockRuntime::new());
        let orchestrator = ContainerOrchestrator::with_runtime(runtime.clone());
        orchestrator.create_container(&config("c1")).await.unwrap();

        let status = orchestrator.get_container_status("c1").await.unwrap();
        assert_eq!(status.state, secure_exec_core::ContainerState::Running);
        assert_eq!(orchestrator.runtime_type().await, Some(RuntimeType::Docker));
    }
}
