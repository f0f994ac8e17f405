#![deny(unused)]
//! Secure execution façade.
//!
//! `SecureExecutor` turns an `ExecutionRequest` into exactly one
//! `ExecutionResult` and one audit event:
//!
//! ```text
//! ExecutionRequest
//!   → permission check   (deny → failure, no container)
//!   → command build      (tool table, `command` fallback)
//!   → blocked commands   (match → blocked, no container)
//!   → sandbox            (create → exec → destroy)
//!   → ExecutionResult + AuditEvent
//! ```

pub mod commands;
pub mod executor;
pub mod protocol;

pub use commands::{build_command, is_mapped, mapped_tools, shell_quote};
pub use executor::{SecureExecutor, ValidationReport};
pub use protocol::{parse_request, render_error, render_result};
