//! JSON-lines request protocol.
//!
//! One `ExecutionRequest` per input line, one `ExecutionResult` per output
//! line. Permission fields left out of a request take the configured
//! sandbox defaults.

use serde_json::{json, Value};

use secure_exec_core::config::SandboxSettings;
use secure_exec_core::{Error, ExecutionRequest, ExecutionResult, Result};

/// Parse one request line, filling omitted limits from `settings`.
pub fn parse_request(line: &str, settings: &SandboxSettings) -> Result<ExecutionRequest> {
    let mut value: Value = serde_json::from_str(line)
        .map_err(|e| Error::invalid_request(format!("Malformed request: {}", e)))?;

    let Some(object) = value.as_object_mut() else {
        return Err(Error::invalid_request("Request must be a JSON object"));
    };

    let permissions = object
        .entry("permissions")
        .or_insert_with(|| json!({}));
    if let Some(permissions) = permissions.as_object_mut() {
        permissions
            .entry("maxMemory")
            .or_insert_with(|| json!(settings.default_memory_bytes));
        permissions
            .entry("maxExecutionTime")
            .or_insert_with(|| json!(settings.default_timeout_ms));
    }

    serde_json::from_value(value)
        .map_err(|e| Error::invalid_request(format!("Malformed request: {}", e)))
}

/// Render a result as one output line.
pub fn render_result(result: &ExecutionResult) -> Result<String> {
    Ok(serde_json::to_string(result)?)
}

/// Render an error that prevented a result as one output line.
pub fn render_error(error: &Error) -> String {
    json!({
        "success": false,
        "error": error.to_string(),
        "executionTime": 0,
    })
    .to_string()
}
