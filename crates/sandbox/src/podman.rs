//! Podman backend, driven through the `podman` CLI.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use secure_exec_core::{
    ContainerConfig, ContainerMount, ContainerState, ContainerStatus, ExecOptions, ExecOutput,
    MountType, Result, RuntimeType,
};

use crate::cli::{EngineCli, TMPFS_SIZE};
use crate::process::ProcessRunner;
use crate::runtime::ContainerRuntime;

pub(crate) const PROBE_ARGS: &[&str] = &["version", "--format", "{{.Version}}"];

// Podman prints Go `time.Time` values verbatim; format them as RFC 3339.
const INSPECT_FORMAT: &str = concat!(
    "{{.State.Status}}|",
    "{{.State.StartedAt.Format \"2006-01-02T15:04:05.999999999Z07:00\"}}|",
    "{{.State.FinishedAt.Format \"2006-01-02T15:04:05.999999999Z07:00\"}}|",
    "{{.State.ExitCode}}|{{.State.Error}}"
);

/// Podman-based container runtime. Same hardening as the Docker backend.
pub struct PodmanRuntime {
    cli: EngineCli,
}

impl PodmanRuntime {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            cli: EngineCli::new(runner, "podman"),
        }
    }

    pub fn with_name_prefix(mut self, prefix: &str) -> Self {
        self.cli.set_name_prefix(prefix);
        self
    }

    /// Full `podman run` argument list for `config`.
    pub fn run_args(&self, config: &ContainerConfig) -> Vec<String> {
        let mut args = self.cli.common_run_args(config);
        if config.security.no_new_privileges {
            args.push("--security-opt=no-new-privileges".to_string());
        }
        args.extend(config.mounts.iter().map(mount_flag));
        args.extend(self.cli.image_and_command(config));
        args
    }
}

fn mount_flag(mount: &ContainerMount) -> String {
    let mode = if mount.read_only { "ro" } else { "rw" };
    match mount.kind {
        MountType::Bind | MountType::Volume => {
            format!("--volume={}:{}:{}", mount.source, mount.target, mode)
        }
        MountType::Tmpfs => format!("--tmpfs={}:{},size={}", mount.target, mode, TMPFS_SIZE),
    }
}

/// Map `podman inspect` and `podman ps` state text.
fn map_state(status: &str) -> ContainerState {
    match status {
        "configured" | "created" | "initialized" => ContainerState::Pending,
        "running" | "paused" => ContainerState::Running,
        "stopping" | "stopped" | "exited" | "removing" => ContainerState::Stopped,
        _ => ContainerState::Error,
    }
}

#[async_trait]
impl ContainerRuntime for PodmanRuntime {
    fn runtime_type(&self) -> RuntimeType {
        RuntimeType::Podman
    }

    async fn is_available(&self) -> bool {
        self.cli.probe(PROBE_ARGS).await
    }

    async fn create_container(&self, config: &ContainerConfig) -> Result<ContainerStatus> {
        self.cli.start(config, self.run_args(config)).await
    }

    async fn exec_in_container(
        &self,
        container_id: &str,
        command: &[String],
        options: &ExecOptions,
    ) -> Result<ExecOutput> {
        Ok(self.cli.exec(container_id, command, options).await)
    }

    async fn stop_container(&self, container_id: &str, grace: Duration) -> Result<()> {
        self.cli.stop(container_id, grace).await
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        self.cli.remove(container_id, force, &["--ignore"]).await
    }

    async fn get_container_status(&self, container_id: &str) -> Result<ContainerStatus> {
        self.cli.inspect(container_id, INSPECT_FORMAT, map_state).await
    }

    async fn get_container_logs(&self, container_id: &str, tail: Option<usize>) -> Result<String> {
        self.cli.logs(container_id, tail).await
    }

    async fn list_containers(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ContainerStatus>> {
        self.cli.list(labels, map_state).await
    }
}
