//! Docker backend, driven through the `docker` CLI.

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

/// Succeeds only when the daemon answers, not merely when the CLI exists.
pub(crate) const PROBE_ARGS: &[&str] = &["version", "--format", "{{.Server.Version}}"];

const INSPECT_FORMAT: &str =
    "{{.State.Status}}|{{.State.StartedAt}}|{{.State.FinishedAt}}|{{.State.ExitCode}}|{{.State.Error}}";

/// Docker-based container runtime.
///
/// Creates isolated containers with:
/// - Memory, CPU and process-count limits
/// - Read-only root filesystem
/// - All capabilities dropped and privilege escalation disabled
/// - A bounded keep-alive process, removed by the engine when it ends
pub struct DockerRuntime {
    cli: EngineCli,
}

impl DockerRuntime {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            cli: EngineCli::new(runner, "docker"),
        }
    }

    /// Prefix engine-side container names with `prefix`.
    pub fn with_name_prefix(mut self, prefix: &str) -> Self {
        self.cli.set_name_prefix(prefix);
        self
    }

    /// Full `docker run` argument list for `config`.
    pub fn run_args(&self, config: &ContainerConfig) -> Vec<String> {
        let mut args = self.cli.common_run_args(config);
        if config.security.no_new_privileges {
            args.push("--security-opt=no-new-privileges:true".to_string());
        }
        args.extend(config.mounts.iter().map(mount_flag));
        args.extend(self.cli.image_and_command(config));
        args
    }
}

fn mount_flag(mount: &ContainerMount) -> String {
    match mount.kind {
        MountType::Bind | MountType::Volume => {
            let kind = if mount.kind == MountType::Bind {
                "bind"
            } else {
                "volume"
            };
            let mut flag = format!(
                "--mount=type={},source={},target={}",
                kind, mount.source, mount.target
            );
            if mount.read_only {
                flag.push_str(",readonly");
            }
            flag
        }
        MountType::Tmpfs => format!(
            "--tmpfs={}:{},size={}",
            mount.target,
            if mount.read_only { "ro" } else { "rw" },
            TMPFS_SIZE
        ),
    }
}

/// Map `docker inspect` and `docker ps` state text.
fn map_state(status: &str) -> ContainerState {
    match status {
        "created" => ContainerState::Pending,
        "running" | "paused" | "restarting" => ContainerState::Running,
        "exited" | "removing" => ContainerState::Stopped,
        _ => ContainerState::Error,
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn runtime_type(&self) -> RuntimeType {
        RuntimeType::Docker
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
        self.cli.remove(container_id, force, &[]).await
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
