#![deny(unused)]
//! Governance for secure execution.
//!
//! This crate provides:
//! - Blocked-command validation
//! - Tool permission checks
//! - Audit sinks
//! - Distributed tracing and metrics

pub mod audit;
pub mod blocklist;
pub mod metrics;
pub mod permissions;
pub mod tracing_layer;

pub use audit::{AuditFilter, FileAuditSink, InMemoryAuditSink, TracingAuditSink};
pub use blocklist::{BlockedCommandMatch, BlockedCommandValidator, CommandValidation};
pub use metrics::{setup_metrics_recorder, track_container_destroyed, track_execution};
pub use permissions::{check_tool_permission, PermissionDecision};
pub use tracing_layer::{configure_tracing, shutdown_tracing};
