//! Error types for the secure execution core.

use thiserror::Error;

/// Result type alias using the core Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type.
///
/// Permission denials and blocked commands are not errors: they surface as a
/// failed `ExecutionResult`. Only misconfiguration and unresolvable request
/// shapes escape the executor as `Err`.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown tool '{0}': no command mapping and no 'command' argument")]
    UnknownTool(String),

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    #[error("Container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("Container runtime '{0}' is not yet implemented")]
    RuntimeNotImplemented(String),

    #[error("Failed to create container: {0}")]
    ContainerCreate(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Container operation failed: {0}")]
    ContainerOperation(String),

    #[error("Process error: {0}")]
    Process(String),

    // =========================================================================
    // Governance Errors
    // =========================================================================
    #[error("Security policy error: {0}")]
    SecurityPolicy(String),

    #[error("Audit error: {0}")]
    Audit(String),

    #[error("Governance error: {0}")]
    Governance(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create an unknown tool error.
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool(name.into())
    }

    /// Create a runtime unavailable error.
    pub fn runtime_unavailable(msg: impl Into<String>) -> Self {
        Self::RuntimeUnavailable(msg.into())
    }

    /// Create a container creation error.
    pub fn container_create(msg: impl Into<String>) -> Self {
        Self::ContainerCreate(msg.into())
    }

    /// Create a container operation error.
    pub fn container_operation(msg: impl Into<String>) -> Self {
        Self::ContainerOperation(msg.into())
    }

    /// Create a process error.
    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }

    /// Create an audit error.
    pub fn audit(msg: impl Into<String>) -> Self {
        Self::Audit(msg.into())
    }

    /// Create a governance error.
    pub fn governance(msg: impl Into<String>) -> Self {
        Self::Governance(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error indicates a misconfigured host or request rather
    /// than a runtime or security condition.
    pub fn is_configuration_fault(&self) -> bool {
        matches!(
            self,
            Self::UnknownTool(_)
                | Self::InvalidRequest(_)
                | Self::RuntimeUnavailable(_)
                | Self::RuntimeNotImplemented(_)
                | Self::Config(_)
        )
    }
}
