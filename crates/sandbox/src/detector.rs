//! Host probing for an available container engine.

use std::sync::Arc;
use std::time::Duration;

use secure_exec_core::RuntimeType;

use crate::process::ProcessRunner;
use crate::{docker, podman};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Probes the host for a container engine, in fixed preference order:
/// Docker, Podman, then Apple Container on macOS.
///
/// Probing is read-only and never retried.
pub struct RuntimeDetector {
    runner: Arc<dyn ProcessRunner>,
    preferred: Option<RuntimeType>,
}

impl RuntimeDetector {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            preferred: None,
        }
    }

    /// Probe `preferred` before the fixed order.
    pub fn with_preferred(mut self, preferred: Option<RuntimeType>) -> Self {
        self.preferred = preferred;
        self
    }

    /// Engines in the order they are probed.
    pub fn candidates(&self) -> Vec<RuntimeType> {
        let mut order = Vec::with_capacity(4);
        if let Some(preferred) = self.preferred {
            order.push(preferred);
        }
        let mut fixed = vec![RuntimeType::Docker, RuntimeType::Podman];
        if cfg!(target_os = "macos") {
            fixed.push(RuntimeType::AppleContainer);
        }
        for runtime in fixed {
            if !order.contains(&runtime) {
                order.push(runtime);
            }
        }
        order
    }

    /// First engine that answers, if any.
    pub async fn detect(&self) -> Option<RuntimeType> {
        for runtime in self.candidates() {
            if self.probe(runtime).await {
                tracing::info!(runtime = %runtime, "Container runtime detected");
                return Some(runtime);
            }
            tracing::debug!(runtime = %runtime, "Container runtime not available");
        }
        tracing::warn!("No container runtime detected");
        None
    }

    /// Whether `runtime` answers on this host.
    pub async fn probe(&self, runtime: RuntimeType) -> bool {
        let Some(args) = probe_args(runtime) else {
            return false;
        };
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        match self
            .runner
            .run(runtime.binary(), &args, Some(PROBE_TIMEOUT))
            .await
        {
            Ok(output) => output.success(),
            Err(e) => {
                tracing::trace!(runtime = %runtime, error = %e, "Runtime probe failed");
                false
            }
        }
    }
}

/// Probe command proving the engine is usable, not merely installed.
fn probe_args(runtime: RuntimeType) -> Option<&'static [&'static str]> {
    match runtime {
        RuntimeType::Docker => Some(docker::PROBE_ARGS),
        RuntimeType::Podman => Some(podman::PROBE_ARGS),
        RuntimeType::AppleContainer => Some(&["--version"]),
        RuntimeType::Rootless => None,
    }
}
