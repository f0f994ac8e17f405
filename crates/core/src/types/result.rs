use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ExecOutput;

/// Outcome of one `ExecutionRequest`, returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock time in milliseconds.
    pub execution_time: u64,
}

impl ExecutionResult {
    /// A rejection that never reached a container.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            execution_time: 0,
        }
    }

    /// A failure raised while provisioning or running the sandbox.
    pub fn failure(error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            execution_time: elapsed.as_millis() as u64,
        }
    }

    /// Convert an exec result; exit code 0 means success.
    pub fn from_exec(exec: &ExecOutput, elapsed: Duration) -> Self {
        let success = exec.success();
        let error = if success {
            None
        } else if exec.stderr.trim().is_empty() {
            Some(format!("Command exited with code {}", exec.exit_code))
        } else {
            Some(exec.stderr.clone())
        };
        Self {
            success,
            output: Some(exec.stdout.clone()),
            error,
            execution_time: elapsed.as_millis() as u64,
        }
    }
}
