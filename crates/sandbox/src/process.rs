//! Subprocess execution for engine CLIs.
//!
//! Every container operation is a CLI invocation routed through a
//! `ProcessRunner`, so backends can be exercised without spawning anything.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use secure_exec_core::{Error, Result};

/// Captured output of one finished (or killed) subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal or the deadline.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ProcessOutput {
    /// A zero exit with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            timed_out: false,
            elapsed: Duration::ZERO,
        }
    }

    /// A non-zero exit with the given stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
            timed_out: false,
            elapsed: Duration::ZERO,
        }
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Spawns a program and collects its output.
///
/// Returns `Err` only when the program could not be started at all; a
/// non-zero exit or a missed deadline is reported in `ProcessOutput`.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput>;
}

// =============================================================================
// Tokio Process Runner
// =============================================================================

/// Runner backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput> {
        let started = Instant::now();

        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::process(format!("Failed to spawn {}: {}", program, e)))?;

        let waited = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => {
                    // Dropping the future drops the child, which kills it.
                    tracing::warn!(program = %program, timeout = ?limit, "Process timed out");
                    return Ok(ProcessOutput {
                        exit_code: None,
                        stdout: String::new(),
                        stderr: String::new(),
                        timed_out: true,
                        elapsed: started.elapsed(),
                    });
                }
            },
            None => child.wait_with_output().await,
        };

        let output =
            waited.map_err(|e| Error::process(format!("Failed to wait for {}: {}", program, e)))?;

        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
            elapsed: started.elapsed(),
        })
    }
}

// =============================================================================
// Mock Process Runner (for testing without an engine)
// =============================================================================

/// Recording runner that never spawns a process.
///
/// Responses are queued per subcommand (the first argument, e.g. `exec`).
/// Unqueued calls succeed with empty output.
#[derive(Default)]
pub struct MockProcessRunner {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    responses: Mutex<HashMap<String, VecDeque<ProcessOutput>>>,
    delays: Mutex<HashMap<String, Duration>>,
    unavailable: Mutex<HashSet<String>>,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next call whose first argument is `subcommand`.
    pub fn push_response(&self, subcommand: &str, output: ProcessOutput) {
        self.responses
            .lock()
            .unwrap()
            .entry(subcommand.to_string())
            .or_default()
            .push_back(output);
    }

    /// Make every `subcommand` call take `delay` before answering.
    pub fn set_delay(&self, subcommand: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(subcommand.to_string(), delay);
    }

    /// Make spawning `program` fail, as if it were not installed.
    pub fn set_unavailable(&self, program: &str) {
        self.unavailable.lock().unwrap().insert(program.to_string());
    }

    /// Every recorded `(program, args)` pair, in call order.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Argument lists of calls with the given subcommand.
    pub fn calls_for(&self, subcommand: &str) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, args)| args.first().map(String::as_str) == Some(subcommand))
            .map(|(_, args)| args.clone())
            .collect()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));

        if self.unavailable.lock().unwrap().contains(program) {
            return Err(Error::process(format!(
                "Failed to spawn {}: No such file or directory",
                program
            )));
        }

        let subcommand = args.first().cloned().unwrap_or_default();
        let delay = self.delays.lock().unwrap().get(&subcommand).copied();
        if let Some(delay) = delay {
            if let Some(limit) = timeout.filter(|limit| *limit < delay) {
                tokio::time::sleep(limit).await;
                return Ok(ProcessOutput {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    timed_out: true,
                    elapsed: limit,
                });
            }
            tokio::time::sleep(delay).await;
        }

        let queued = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&subcommand)
            .and_then(VecDeque::pop_front);
        Ok(queued.unwrap_or_else(|| ProcessOutput::ok("")))
    }
}
