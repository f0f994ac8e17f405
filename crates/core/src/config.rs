use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::types::{RuntimeType, DEFAULT_MAX_EXECUTION_TIME_MS, DEFAULT_MAX_MEMORY_BYTES};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub sandbox: SandboxSettings,
    #[serde(default)]
    pub runtime: RuntimeSettings,
    pub governance: GovernanceSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxSettings {
    /// Image every sandbox is created from.
    pub image: String,
    pub default_memory_bytes: u64,
    pub default_cpus: f64,
    pub default_timeout_ms: u64,
    /// Prefix under which allowed host paths are mounted.
    pub workspace_prefix: String,
    /// Prefix of engine-side container names.
    pub container_prefix: String,
    /// Grace period for the stop phase of teardown.
    pub stop_grace_secs: u64,
    pub pids_limit: Option<u32>,
    pub seccomp_profile: Option<String>,
}

impl SandboxSettings {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RuntimeSettings {
    /// Engine probed before the fixed preference order.
    pub preferred: Option<RuntimeType>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GovernanceSettings {
    /// Append audit events as JSON lines to this file when set.
    pub audit_log_path: Option<String>,
    pub json_logs: bool,
    pub enable_metrics: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("SECURE_EXEC_ENV").unwrap_or_else(|_| "development".into());
        let defaults = Self::default();

        let s = Config::builder()
            .set_default("sandbox.image", defaults.sandbox.image)?
            .set_default("sandbox.default_memory_bytes", defaults.sandbox.default_memory_bytes)?
            .set_default("sandbox.default_cpus", defaults.sandbox.default_cpus)?
            .set_default("sandbox.default_timeout_ms", defaults.sandbox.default_timeout_ms)?
            .set_default("sandbox.workspace_prefix", defaults.sandbox.workspace_prefix)?
            .set_default("sandbox.container_prefix", defaults.sandbox.container_prefix)?
            .set_default("sandbox.stop_grace_secs", defaults.sandbox.stop_grace_secs)?
            .set_default("sandbox.pids_limit", 128_u64)?
            .set_default("governance.json_logs", defaults.governance.json_logs)?
            .set_default("governance.enable_metrics", defaults.governance.enable_metrics)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map SECURE_EXEC__SANDBOX__IMAGE=foo to sandbox.image
            .add_source(Environment::with_prefix("SECURE_EXEC").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxSettings {
                image: "secure-exec-sandbox:latest".into(),
                default_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
                default_cpus: 1.0,
                default_timeout_ms: DEFAULT_MAX_EXECUTION_TIME_MS,
                workspace_prefix: "/workspace".into(),
                container_prefix: "secure-exec".into(),
                stop_grace_secs: 10,
                pids_limit: Some(128),
                seccomp_profile: None,
            },
            runtime: RuntimeSettings { preferred: None },
            governance: GovernanceSettings {
                audit_log_path: None,
                json_logs: false,
                enable_metrics: false,
            },
        }
    }
}
