//! Engine CLI plumbing shared by the Docker and Podman backends.
//!
//! Both engines accept the same `run`/`exec`/`inspect`/`logs`/`stop`/`ps`
//! grammar; only the flags collected by each backend differ.

use chrono::{DateTime, Datelike, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use secure_exec_core::{
    ContainerConfig, ContainerState, ContainerStatus, Error, ExecOptions, ExecOutput, Result,
};

use crate::process::{ProcessOutput, ProcessRunner};
use crate::runtime::{DEFAULT_NAME_PREFIX, LABEL_AGENT, LABEL_MANAGED, LABEL_SESSION};

/// Deadline for control-plane commands (run, inspect, rm, ps).
const CONTROL_TIMEOUT: Duration = Duration::from_secs(120);

/// Extra time the engine gets on top of the stop grace period.
const STOP_SLACK: Duration = Duration::from_secs(30);

/// Lifetime of the keep-alive process beyond the execution timeout.
const KEEPALIVE_GRACE: Duration = Duration::from_secs(60);

/// `ps` row layout: engine id, name, state, human-readable status.
const PS_FORMAT: &str = "{{.ID}}|{{.Names}}|{{.State}}|{{.Status}}";

/// Size of tmpfs mounts.
pub(crate) const TMPFS_SIZE: &str = "64m";

pub(crate) struct EngineCli {
    runner: Arc<dyn ProcessRunner>,
    binary: &'static str,
    name_prefix: String,
}

impl EngineCli {
    pub(crate) fn new(runner: Arc<dyn ProcessRunner>, binary: &'static str) -> Self {
        Self {
            runner,
            binary,
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
        }
    }

    pub(crate) fn set_name_prefix(&mut self, prefix: &str) {
        self.name_prefix = prefix.to_string();
    }

    /// Engine-side name of a container.
    pub(crate) fn container_name(&self, container_id: &str) -> String {
        format!("{}-{}", self.name_prefix, container_id)
    }

    /// Recover a container id from an engine-side name.
    pub(crate) fn container_id_from_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        name.strip_prefix(self.name_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .filter(|id| !id.is_empty())
    }

    pub(crate) async fn run(
        &self,
        args: Vec<String>,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput> {
        tracing::trace!(binary = self.binary, args = ?args, "Invoking engine CLI");
        self.runner.run(self.binary, &args, timeout).await
    }

    /// Whether a probe command succeeds.
    pub(crate) async fn probe(&self, args: &[&str]) -> bool {
        let args = args.iter().map(|s| s.to_string()).collect();
        match self.run(args, Some(Duration::from_secs(10))).await {
            Ok(output) => output.success(),
            Err(_) => false,
        }
    }

    /// `run` flags both engines understand, up to but excluding mounts.
    pub(crate) fn common_run_args(&self, config: &ContainerConfig) -> Vec<String> {
        let resources = &config.resources;
        let security = &config.security;

        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--rm".to_string(),
            "--init".to_string(),
            format!("--name={}", self.container_name(&config.container_id)),
            format!("--label={}=true", LABEL_MANAGED),
            format!("--label={}={}", LABEL_SESSION, config.session_id),
            format!("--label={}={}", LABEL_AGENT, config.agent_id),
            format!("--memory={}", resources.memory_bytes),
            format!("--memory-swap={}", resources.memory_bytes),
            format!("--cpus={}", resources.cpus),
            format!("--network={}", config.network.as_flag()),
        ];

        if let Some(pids) = resources.pids_limit {
            args.push(format!("--pids-limit={}", pids));
        }
        if security.read_only_root_filesystem {
            args.push("--read-only".to_string());
        }
        for cap in &security.drop_capabilities {
            args.push(format!("--cap-drop={}", cap));
        }
        if let Some(profile) = &security.seccomp_profile {
            args.push(format!("--security-opt=seccomp={}", profile));
        }
        for (key, value) in &config.env {
            args.push(format!("--env={}={}", key, value));
        }

        args
    }

    /// Image and keep-alive command closing a `run` invocation.
    pub(crate) fn image_and_command(&self, config: &ContainerConfig) -> Vec<String> {
        let lifetime = config.resources.timeout + KEEPALIVE_GRACE;
        vec![
            config.image.clone(),
            "sleep".to_string(),
            lifetime.as_secs().max(1).to_string(),
        ]
    }

    /// Execute a fully built `run` invocation.
    pub(crate) async fn start(
        &self,
        config: &ContainerConfig,
        args: Vec<String>,
    ) -> Result<ContainerStatus> {
        let container_id = config.container_id.as_str();

        let output = self
            .run(args, Some(CONTROL_TIMEOUT))
            .await
            .map_err(|e| Error::container_create(e.to_string()))?;

        if output.timed_out {
            // The engine may still finish creating it.
            let cleanup = self
                .run(
                    vec![
                        "rm".to_string(),
                        "-f".to_string(),
                        self.container_name(container_id),
                    ],
                    Some(CONTROL_TIMEOUT),
                )
                .await;
            match cleanup {
                Ok(rm) if rm.success() || is_not_found(&rm.stderr) => {}
                Ok(rm) => tracing::warn!(
                    container_id = %container_id,
                    error = %failure_text(&rm),
                    "Failed to remove container after start timeout"
                ),
                Err(e) => tracing::warn!(
                    container_id = %container_id,
                    error = %e,
                    "Failed to remove container after start timeout"
                ),
            }
            return Err(Error::container_create(format!(
                "{} run timed out after {:?}",
                self.binary, CONTROL_TIMEOUT
            )));
        }

        if !output.success() {
            return Err(Error::container_create(format!(
                "{} run exited with {:?}: {}",
                self.binary,
                output.exit_code,
                output.stderr.trim()
            )));
        }

        tracing::info!(
            container_id = %container_id,
            engine_id = %output.stdout.trim(),
            image = %config.image,
            runtime = self.binary,
            "Sandbox container created and started"
        );

        Ok(ContainerStatus::running(container_id))
    }

    pub(crate) async fn exec(
        &self,
        container_id: &str,
        command: &[String],
        options: &ExecOptions,
    ) -> ExecOutput {
        let started = Instant::now();

        let mut args = vec!["exec".to_string()];
        if let Some(dir) = &options.working_dir {
            args.push(format!("--workdir={}", dir));
        }
        args.push(self.container_name(container_id));
        args.extend(command.iter().cloned());

        match self.run(args, options.timeout).await {
            Ok(output) if output.timed_out => {
                let timeout = options.timeout.unwrap_or_else(|| started.elapsed());
                tracing::warn!(container_id = %container_id, timeout = ?timeout, "Sandbox exec timed out");
                ExecOutput::timeout(timeout, output.stdout, output.stderr)
            }
            Ok(output) => ExecOutput {
                exit_code: output.exit_code.map(i64::from).unwrap_or(-1),
                stdout: output.stdout,
                stderr: output.stderr,
                execution_time: started.elapsed(),
                timed_out: false,
            },
            Err(e) => {
                tracing::warn!(container_id = %container_id, error = %e, "Sandbox exec failed to start");
                ExecOutput::failed(e.to_string(), started.elapsed())
            }
        }
    }

    pub(crate) async fn stop(&self, container_id: &str, grace: Duration) -> Result<()> {
        let args = vec![
            "stop".to_string(),
            format!("--time={}", grace.as_secs()),
            self.container_name(container_id),
        ];
        let output = self.run(args, Some(grace + STOP_SLACK)).await?;

        if output.success() || is_not_found(&output.stderr) {
            return Ok(());
        }
        Err(Error::container_operation(format!(
            "Failed to stop {}: {}",
            container_id,
            failure_text(&output)
        )))
    }

    /// `rm` with backend-specific extra flags. A missing container is success.
    pub(crate) async fn remove(
        &self,
        container_id: &str,
        force: bool,
        extra_flags: &[&str],
    ) -> Result<()> {
        let mut args = vec!["rm".to_string()];
        if force {
            args.push("-f".to_string());
        }
        args.extend(extra_flags.iter().map(|s| s.to_string()));
        args.push(self.container_name(container_id));

        let output = self.run(args, Some(CONTROL_TIMEOUT)).await?;
        if output.success() || is_not_found(&output.stderr) {
            return Ok(());
        }
        Err(Error::container_operation(format!(
            "Failed to remove {}: {}",
            container_id,
            failure_text(&output)
        )))
    }

    pub(crate) async fn inspect(
        &self,
        container_id: &str,
        format: &str,
        map_state: fn(&str) -> ContainerState,
    ) -> Result<ContainerStatus> {
        let args = vec![
            "inspect".to_string(),
            format!("--format={}", format),
            self.container_name(container_id),
        ];
        let output = self.run(args, Some(CONTROL_TIMEOUT)).await?;

        if !output.success() {
            if is_not_found(&output.stderr) {
                return Ok(ContainerStatus::error(
                    container_id,
                    format!("Container not found: {}", container_id),
                ));
            }
            return Err(Error::container_operation(format!(
                "Failed to inspect {}: {}",
                container_id,
                failure_text(&output)
            )));
        }

        Ok(parse_inspect(container_id, &output.stdout, map_state))
    }

    pub(crate) async fn logs(&self, container_id: &str, tail: Option<usize>) -> Result<String> {
        let mut args = vec!["logs".to_string()];
        if let Some(tail) = tail {
            args.push(format!("--tail={}", tail));
        }
        args.push(self.container_name(container_id));

        let output = self.run(args, Some(CONTROL_TIMEOUT)).await?;
        if !output.success() {
            if is_not_found(&output.stderr) {
                return Err(Error::ContainerNotFound(container_id.to_string()));
            }
            return Err(Error::container_operation(format!(
                "Failed to fetch logs of {}: {}",
                container_id,
                failure_text(&output)
            )));
        }

        // The engine replays the container's stdout and stderr on its own.
        let mut logs = output.stdout;
        logs.push_str(&output.stderr);
        Ok(logs)
    }

    pub(crate) async fn list(
        &self,
        labels: &BTreeMap<String, String>,
        map_state: fn(&str) -> ContainerState,
    ) -> Result<Vec<ContainerStatus>> {
        let mut args = vec![
            "ps".to_string(),
            "-a".to_string(),
            format!("--filter=label={}=true", LABEL_MANAGED),
        ];
        for (key, value) in labels {
            args.push(format!("--filter=label={}={}", key, value));
        }
        args.push(format!("--format={}", PS_FORMAT));

        let output = self.run(args, Some(CONTROL_TIMEOUT)).await?;
        if !output.success() {
            return Err(Error::container_operation(format!(
                "Failed to list containers: {}",
                failure_text(&output)
            )));
        }

        Ok(output
            .stdout
            .lines()
            .filter_map(|line| self.parse_ps_line(line, map_state))
            .collect())
    }

    /// Parse one `id|name|state|status` line. Names outside the prefix are skipped.
    pub(crate) fn parse_ps_line(
        &self,
        line: &str,
        map_state: fn(&str) -> ContainerState,
    ) -> Option<ContainerStatus> {
        let mut fields = line.trim().splitn(4, '|');
        let _engine_id = fields.next()?;
        let name = fields.next()?.trim();
        let state = map_state(fields.next().unwrap_or_default().trim());
        let status = fields.next().unwrap_or_default().trim();

        let container_id = self.container_id_from_name(name)?;
        Some(ContainerStatus {
            container_id: container_id.to_string(),
            state,
            started_at: Utc::now(),
            finished_at: None,
            exit_code: None,
            error: (state == ContainerState::Error && !status.is_empty())
                .then(|| status.to_string()),
        })
    }
}

/// Whether engine stderr reports a missing container.
pub(crate) fn is_not_found(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("no such container") || stderr.contains("no container with")
}

fn failure_text(output: &ProcessOutput) -> String {
    if output.timed_out {
        return "timed out".to_string();
    }
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        format!("exit code {:?}", output.exit_code)
    } else {
        stderr.to_string()
    }
}

/// Parse an RFC 3339 timestamp, treating the engine's zero time as absent.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value.trim()).ok()?;
    let parsed = parsed.with_timezone(&Utc);
    (parsed.year() > 1).then_some(parsed)
}

/// Parse `status|startedAt|finishedAt|exitCode|error` inspect output.
pub(crate) fn parse_inspect(
    container_id: &str,
    stdout: &str,
    map_state: fn(&str) -> ContainerState,
) -> ContainerStatus {
    let mut fields = stdout.trim().splitn(5, '|');
    let status = fields.next().unwrap_or_default().trim();
    let started = fields.next().unwrap_or_default();
    let finished = fields.next().unwrap_or_default();
    let exit_code = fields.next().unwrap_or_default();
    let error = fields.next().unwrap_or_default().trim();

    let state = map_state(status);
    let terminal = state.is_terminal();

    ContainerStatus {
        container_id: container_id.to_string(),
        state,
        started_at: parse_timestamp(started).unwrap_or_else(Utc::now),
        finished_at: if terminal { parse_timestamp(finished) } else { None },
        exit_code: if terminal {
            exit_code.trim().parse().ok()
        } else {
            None
        },
        error: if error.is_empty() {
            None
        } else {
            Some(error.to_string())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockProcessRunner;
    use secure_exec_core::{NetworkMode, RuntimeType};

    fn cli() -> EngineCli {
        EngineCli::new(Arc::new(MockProcessRunner::new()), "docker")
    }

    fn any_state(status: &str) -> ContainerState {
        match status {
            "running" => ContainerState::Running,
            "exited" => ContainerState::Stopped,
            _ => ContainerState::Error,
        }
    }

    #[test]
    fn test_container_names() {
        let mut cli = cli();
        assert_eq!(cli.container_name("abc"), "secure-exec-abc");
        assert_eq!(cli.container_id_from_name("secure-exec-abc"), Some("abc"));
        assert_eq!(cli.container_id_from_name("other-abc"), None);
        assert_eq!(cli.container_id_from_name("secure-exec-"), None);

        cli.set_name_prefix("sbx");
        assert_eq!(cli.container_name("abc"), "sbx-abc");
    }

    #[test]
    fn test_common_run_args() {
        let config = ContainerConfig::new("abc", "s1", "a1", RuntimeType::Docker, "img:1")
            .with_env("LANG", "C")
            .with_network(NetworkMode::None);
        let args = cli().common_run_args(&config);

        for expected in [
            "run",
            "-d",
            "--rm",
            "--init",
            "--name=secure-exec-abc",
            "--label=secure-exec.managed=true",
            "--label=secure-exec.session=s1",
            "--label=secure-exec.agent=a1",
            "--memory=536870912",
            "--cpus=1",
            "--network=none",
            "--pids-limit=128",
            "--read-only",
            "--cap-drop=ALL",
            "--env=LANG=C",
        ] {
            assert!(args.contains(&expected.to_string()), "missing {}", expected);
        }
        assert!(!args.iter().any(|a| a.starts_with("--security-opt=seccomp")));
    }

    #[test]
    fn test_init_reaps_keepalive() {
        let config = ContainerConfig::new("abc", "s1", "a1", RuntimeType::Docker, "img:1");
        let args = cli().common_run_args(&config);
        let init = args.iter().position(|a| a == "--init").unwrap();
        assert_eq!(&args[..init], &["run", "-d", "--rm"]);
    }

    #[test]
    fn test_parse_ps_line() {
        let cli = cli();
        let running = cli
            .parse_ps_line("4f2a|secure-exec-c1|running|Up 2 seconds", any_state)
            .unwrap();
        assert_eq!(running.container_id, "c1");
        assert_eq!(running.state, ContainerState::Running);
        assert_eq!(running.error, None);

        let dead = cli
            .parse_ps_line("9b1c|secure-exec-c2|dead|Dead\n", any_state)
            .unwrap();
        assert_eq!(dead.state, ContainerState::Error);
        assert_eq!(dead.error.as_deref(), Some("Dead"));

        assert!(cli.parse_ps_line("77aa|unrelated|running|Up", any_state).is_none());
        assert!(cli.parse_ps_line("", any_state).is_none());
    }

    #[tokio::test]
    async fn test_start_timeout_removes_leftover() {
        let runner = Arc::new(MockProcessRunner::new());
        let cli = EngineCli::new(runner.clone(), "docker");
        runner.push_response(
            "run",
            ProcessOutput {
                exit_code: None,
                timed_out: true,
                ..ProcessOutput::ok("")
            },
        );
        runner.push_response("rm", ProcessOutput::failed(1, "permission denied"));

        let config = ContainerConfig::new("abc", "s1", "a1", RuntimeType::Docker, "img:1");
        let result = cli.start(&config, cli.common_run_args(&config)).await;
        assert!(matches!(result, Err(Error::ContainerCreate(_))));
        assert_eq!(runner.calls_for("rm")[0], vec!["rm", "-f", "secure-exec-abc"]);
    }

    #[test]
    fn test_keepalive_outlives_timeout() {
        let config = ContainerConfig::new("abc", "s1", "a1", RuntimeType::Docker, "img:1");
        let tail = cli().image_and_command(&config);
        assert_eq!(tail, vec!["img:1", "sleep", "90"]);
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found("Error: No such container: secure-exec-abc"));
        assert!(is_not_found("Error: no container with name or ID \"x\" found"));
        assert!(!is_not_found("permission denied"));
    }

    #[test]
    fn test_parse_timestamp() {
        assert!(parse_timestamp("2025-03-01T10:00:00.123456789Z").is_some());
        assert!(parse_timestamp("2025-03-01T10:00:00+02:00").is_some());
        assert!(parse_timestamp("0001-01-01T00:00:00Z").is_none());
        assert!(parse_timestamp("garbage").is_none());
    }

    #[test]
    fn test_parse_inspect() {
        let running = parse_inspect(
            "abc",
            "running|2025-03-01T10:00:00Z|0001-01-01T00:00:00Z|0|\n",
            any_state,
        );
        assert_eq!(running.state, ContainerState::Running);
        assert_eq!(running.exit_code, None);
        assert_eq!(running.finished_at, None);
        assert_eq!(running.error, None);

        let exited = parse_inspect(
            "abc",
            "exited|2025-03-01T10:00:00Z|2025-03-01T10:00:05Z|137|OOM|killed",
            any_state,
        );
        assert_eq!(exited.state, ContainerState::Stopped);
        assert_eq!(exited.exit_code, Some(137));
        assert!(exited.finished_at.is_some());
        assert_eq!(exited.error.as_deref(), Some("OOM|killed"));
    }
}
