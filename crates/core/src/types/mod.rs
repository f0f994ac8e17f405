//! Core type definitions for the secure execution core.
//!
//! Request types arrive from the agent layer, container types describe one
//! sandbox, and result types flow back to the caller.

pub mod container;
pub mod request;
pub mod result;
pub mod security;

pub use container::*;
pub use request::*;
pub use result::*;
pub use security::*;
