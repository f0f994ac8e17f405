use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// =============================================================================
// Runtime Types
// =============================================================================

/// Container engine backing a runtime implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeType {
    Docker,
    Podman,
    /// Apple's `container` CLI (macOS). Declared, not implemented.
    AppleContainer,
    /// Future rootless engine. Declared, not implemented.
    Rootless,
}

impl RuntimeType {
    /// CLI binary name for the engine.
    pub fn binary(&self) -> &'static str {
        match self {
            RuntimeType::Docker => "docker",
            RuntimeType::Podman => "podman",
            RuntimeType::AppleContainer => "container",
            RuntimeType::Rootless => "rootless",
        }
    }

    /// Whether a `ContainerRuntime` implementation exists for this engine.
    pub fn is_implemented(&self) -> bool {
        matches!(self, RuntimeType::Docker | RuntimeType::Podman)
    }
}

impl std::fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeType::Docker => write!(f, "docker"),
            RuntimeType::Podman => write!(f, "podman"),
            RuntimeType::AppleContainer => write!(f, "apple-container"),
            RuntimeType::Rootless => write!(f, "rootless"),
        }
    }
}

impl std::str::FromStr for RuntimeType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(RuntimeType::Docker),
            "podman" => Ok(RuntimeType::Podman),
            "apple-container" | "apple" | "container" => Ok(RuntimeType::AppleContainer),
            "rootless" => Ok(RuntimeType::Rootless),
            other => Err(crate::Error::invalid_request(format!(
                "Unknown container runtime: {}",
                other
            ))),
        }
    }
}

/// Network isolation mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// No network access (default).
    None,
    /// Bridge network (standard engine networking).
    Bridge,
    /// Host network (dangerous, never chosen by the executor).
    Host,
    /// Named network.
    Custom(String),
}

impl NetworkMode {
    /// Value passed to `--network=`.
    pub fn as_flag(&self) -> &str {
        match self {
            NetworkMode::None => "none",
            NetworkMode::Bridge => "bridge",
            NetworkMode::Host => "host",
            NetworkMode::Custom(name) => name,
        }
    }
}

/// Kind of filesystem mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountType {
    Bind,
    Volume,
    Tmpfs,
}

/// One filesystem mapping into the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerMount {
    #[serde(rename = "type")]
    pub kind: MountType,
    /// Host path or volume name; empty for tmpfs.
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl ContainerMount {
    pub fn bind(source: impl Into<String>, target: impl Into<String>, read_only: bool) -> Self {
        Self {
            kind: MountType::Bind,
            source: source.into(),
            target: target.into(),
            read_only,
        }
    }

    pub fn volume(name: impl Into<String>, target: impl Into<String>, read_only: bool) -> Self {
        Self {
            kind: MountType::Volume,
            source: name.into(),
            target: target.into(),
            read_only,
        }
    }

    /// An empty tmpfs at `target`.
    pub fn tmpfs(target: impl Into<String>, read_only: bool) -> Self {
        Self {
            kind: MountType::Tmpfs,
            source: String::new(),
            target: target.into(),
            read_only,
        }
    }
}

/// Resource caps for one sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimits {
    pub memory_bytes: u64,
    pub cpus: f64,
    pub timeout: Duration,
    pub pids_limit: Option<u32>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_bytes: crate::types::DEFAULT_MAX_MEMORY_BYTES,
            cpus: 1.0,
            timeout: Duration::from_millis(crate::types::DEFAULT_MAX_EXECUTION_TIME_MS),
            pids_limit: Some(128),
        }
    }
}

/// Container hardening options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityOptions {
    pub read_only_root_filesystem: bool,
    pub no_new_privileges: bool,
    pub drop_capabilities: Vec<String>,
    pub seccomp_profile: Option<String>,
}

impl Default for SecurityOptions {
    fn default() -> Self {
        Self {
            read_only_root_filesystem: true,
            no_new_privileges: true,
            drop_capabilities: vec!["ALL".to_string()],
            seccomp_profile: None,
        }
    }
}

/// Declarative description of one sandbox container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    pub container_id: String,
    pub session_id: String,
    pub agent_id: String,
    pub runtime: RuntimeType,
    pub image: String,
    pub resources: ResourceLimits,
    pub mounts: Vec<ContainerMount>,
    pub env: BTreeMap<String, String>,
    pub network: NetworkMode,
    pub security: SecurityOptions,
}

impl ContainerConfig {
    /// Create a config with hardened defaults and no mounts.
    pub fn new(
        container_id: impl Into<String>,
        session_id: impl Into<String>,
        agent_id: impl Into<String>,
        runtime: RuntimeType,
        image: impl Into<String>,
    ) -> Self {
        Self {
            container_id: container_id.into(),
            session_id: session_id.into(),
            agent_id: agent_id.into(),
            runtime,
            image: image.into(),
            resources: ResourceLimits::default(),
            mounts: Vec::new(),
            env: BTreeMap::new(),
            network: NetworkMode::None,
            security: SecurityOptions::default(),
        }
    }

    pub fn with_resources(mut self, resources: ResourceLimits) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_mount(mut self, mount: ContainerMount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_network(mut self, network: NetworkMode) -> Self {
        self.network = network;
        self
    }

    pub fn with_security(mut self, security: SecurityOptions) -> Self {
        self.security = security;
        self
    }
}

// =============================================================================
// Status Types
// =============================================================================

/// Observed lifecycle state of a sandbox.
///
/// `Stopped` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Pending,
    Running,
    Stopped,
    Error,
}

impl ContainerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ContainerState::Stopped | ContainerState::Error)
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerState::Pending => write!(f, "pending"),
            ContainerState::Running => write!(f, "running"),
            ContainerState::Stopped => write!(f, "stopped"),
            ContainerState::Error => write!(f, "error"),
        }
    }
}

/// Observed status of a sandbox container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    pub container_id: String,
    pub state: ContainerState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i64>,
    pub error: Option<String>,
}

impl ContainerStatus {
    /// A freshly started container.
    pub fn running(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            state: ContainerState::Running,
            started_at: Utc::now(),
            finished_at: None,
            exit_code: None,
            error: None,
        }
    }

    /// A container that could not be observed or failed.
    pub fn error(container_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            state: ContainerState::Error,
            started_at: Utc::now(),
            finished_at: None,
            exit_code: None,
            error: Some(message.into()),
        }
    }
}

// =============================================================================
// Exec Types
// =============================================================================

/// Options for running a command inside a sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    pub timeout: Option<Duration>,
    pub working_dir: Option<String>,
}

impl ExecOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Result of running a command inside a sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecOutput {
    /// Exit code; `-1` when the process could not run or timed out.
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub execution_time: Duration,
    pub timed_out: bool,
}

impl ExecOutput {
    /// Whether the execution was successful (exit code 0, no timeout).
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// A failed execution that never produced an exit code.
    pub fn failed(message: impl Into<String>, execution_time: Duration) -> Self {
        Self {
            exit_code: -1,
            stdout: String::new(),
            stderr: message.into(),
            execution_time,
            timed_out: false,
        }
    }

    /// An execution killed at its deadline.
    pub fn timeout(timeout: Duration, stdout: String, stderr: String) -> Self {
        let stderr = if stderr.is_empty() {
            format!("[Execution timed out after {:?}]", timeout)
        } else {
            format!("{}\n[Execution timed out after {:?}]", stderr, timeout)
        };
        Self {
            exit_code: -1,
            stdout,
            stderr,
            execution_time: timeout,
            timed_out: true,
        }
    }
}
