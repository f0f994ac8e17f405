#![deny(unused)]
//! Sandboxed container execution.
//!
//! This crate drives container engines through their CLIs. Every subprocess
//! goes through a `ProcessRunner`, so the whole stack runs against mocks in
//! tests.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │  ContainerOrchestrator                 │
//! │    registry of active containers       │
//! │    ↓ one selected runtime              │
//! ├────────────────────────────────────────┤
//! │  ContainerRuntime (Docker / Podman)    │
//! │    ↓ engine CLI arguments              │
//! ├────────────────────────────────────────┤
//! │  ProcessRunner (tokio::process)        │
//! └────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use secure_exec_sandbox::{ContainerOrchestrator, TokioProcessRunner};
//!
//! let orchestrator = ContainerOrchestrator::new(Arc::new(TokioProcessRunner));
//! orchestrator.initialize().await?;
//! orchestrator.create_container(&config).await?;
//! let output = orchestrator.exec_in_container(&id, &command, &options).await;
//! orchestrator.destroy_container(&id, false).await;
//! ```

mod cli;
pub mod detector;
pub mod docker;
pub mod mock;
pub mod orchestrator;
pub mod podman;
pub mod process;
pub mod runtime;

pub use detector::RuntimeDetector;
pub use docker::DockerRuntime;
pub use mock::MockRuntime;
pub use orchestrator::{ContainerOrchestrator, StopAllReport, DEFAULT_STOP_GRACE};
pub use podman::PodmanRuntime;
pub use process::{MockProcessRunner, ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use runtime::{
    create_runtime, ContainerRuntime, DEFAULT_NAME_PREFIX, LABEL_AGENT, LABEL_MANAGED,
    LABEL_SESSION,
};
