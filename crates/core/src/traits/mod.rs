//! Core traits shared across crates.
//!
//! - `audit`: audit event consumers (AuditSink)

pub mod audit;

pub use audit::*;
