//! Container runtime abstraction.
//!
//! One implementation per engine, all driven through the engine's CLI. The
//! orchestrator selects a backend once and holds it as `Arc<dyn ContainerRuntime>`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use secure_exec_core::{
    ContainerConfig, ContainerStatus, Error, ExecOptions, ExecOutput, Result, RuntimeType,
};

use crate::docker::DockerRuntime;
use crate::podman::PodmanRuntime;
use crate::process::ProcessRunner;

/// Label marking containers created by this system.
pub const LABEL_MANAGED: &str = "secure-exec.managed";
pub const LABEL_SESSION: &str = "secure-exec.session";
pub const LABEL_AGENT: &str = "secure-exec.agent";

/// Default prefix of engine-side container names.
pub const DEFAULT_NAME_PREFIX: &str = "secure-exec";

/// Trait for container engine backends.
///
/// Every operation addresses containers by the `container_id` they were
/// created with. Backends never leave a container running on their own
/// failure paths: `create_container` either returns a running container or
/// an error.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Engine this backend drives.
    fn runtime_type(&self) -> RuntimeType;

    /// Whether the engine answers (e.g. the Docker daemon is running).
    async fn is_available(&self) -> bool;

    /// Create and start a container in the background.
    async fn create_container(&self, config: &ContainerConfig) -> Result<ContainerStatus>;

    /// Run `command` inside a running container.
    ///
    /// Timeouts and process failures are reported as an `ExecOutput` with
    /// exit code `-1`, not as an error.
    async fn exec_in_container(
        &self,
        container_id: &str,
        command: &[String],
        options: &ExecOptions,
    ) -> Result<ExecOutput>;

    /// Stop a container, waiting up to `grace` before the engine kills it.
    async fn stop_container(&self, container_id: &str, grace: Duration) -> Result<()>;

    /// Remove a container. A container that no longer exists is not an error.
    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()>;

    /// Current status. A missing container yields an `error` status.
    async fn get_container_status(&self, container_id: &str) -> Result<ContainerStatus>;

    /// Container logs, optionally limited to the last `tail` lines.
    async fn get_container_logs(&self, container_id: &str, tail: Option<usize>) -> Result<String>;

    /// Managed containers matching every label filter, running or not.
    async fn list_containers(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ContainerStatus>>;
}

/// Build the backend for `runtime_type`.
pub fn create_runtime(
    runtime_type: RuntimeType,
    runner: Arc<dyn ProcessRunner>,
    name_prefix: &str,
) -> Result<Arc<dyn ContainerRuntime>> {
    match runtime_type {
        RuntimeType::Docker => Ok(Arc::new(
            DockerRuntime::new(runner).with_name_prefix(name_prefix),
        )),
        RuntimeType::Podman => Ok(Arc::new(
            PodmanRuntime::new(runner).with_name_prefix(name_prefix),
        )),
        other => Err(Error::RuntimeNotImplemented(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockProcessRunner;

    #[test]
    fn test_create_runtime_variants() {
        let runner: Arc<dyn ProcessRunner> = Arc::new(MockProcessRunner::new());
        let docker = create_runtime(RuntimeType::Docker, runner.clone(), "x").unwrap();
        assert_eq!(docker.runtime_type(), RuntimeType::Docker);
        let podman = create_runtime(RuntimeType::Podman, runner.clone(), "x").unwrap();
        assert_eq!(podman.runtime_type(), RuntimeType::Podman);

        for unimplemented in [RuntimeType::AppleContainer, RuntimeType::Rootless] {
            let result = create_runtime(unimplemented, runner.clone(), "x");
            assert!(matches!(result, Err(Error::RuntimeNotImplemented(_))));
        }
    }
}
