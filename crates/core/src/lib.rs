#![deny(unused)]
//! Core types, traits, and error definitions for the secure execution core.
//!
//! This crate provides the building blocks shared by the governance,
//! sandbox, and executor layers: the request/result data model, the
//! container description, the audit event, and the error type.

pub mod config;
pub mod error;
pub mod events;
pub mod fs_policy;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use events::*;
pub use traits::*;
pub use types::*;
