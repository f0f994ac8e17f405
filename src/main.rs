#![deny(unused)]
//! secure-exec - sandboxed command execution for AI agents
//!
//! Reads one JSON `ExecutionRequest` per line on stdin, runs it through the
//! secure executor, and writes one JSON `ExecutionResult` per line on stdout.
//! Logs go to stderr.

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use secure_exec_core::config::AppConfig;
use secure_exec_core::AuditSink;
use secure_exec_executor::{parse_request, render_error, render_result, SecureExecutor};
use secure_exec_governance::{FileAuditSink, TracingAuditSink};
use secure_exec_sandbox::{ContainerOrchestrator, TokioProcessRunner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // Initialize tracing
    secure_exec_governance::configure_tracing(config.governance.json_logs)?;

    tracing::info!("Starting secure-exec v{}", env!("CARGO_PKG_VERSION"));

    // =========================================================================
    // Observability
    // =========================================================================
    let metrics_handle = if config.governance.enable_metrics {
        Some(secure_exec_governance::setup_metrics_recorder()?)
    } else {
        None
    };

    // =========================================================================
    // Sandbox
    // =========================================================================
    let orchestrator = Arc::new(
        ContainerOrchestrator::new(Arc::new(TokioProcessRunner))
            .with_preferred_runtime(config.runtime.preferred)
            .with_stop_grace(config.sandbox.stop_grace())
            .with_name_prefix(config.sandbox.container_prefix.clone()),
    );
    orchestrator.initialize().await?;
    tracing::info!(
        runtime = ?orchestrator.runtime_type().await,
        image = %config.sandbox.image,
        "Sandbox runtime initialized"
    );

    // =========================================================================
    // Governance
    // =========================================================================
    let audit_sink: Arc<dyn AuditSink> = match &config.governance.audit_log_path {
        Some(path) => {
            tracing::info!(path = %path, "Writing audit events to file");
            Arc::new(FileAuditSink::new(path))
        }
        None => Arc::new(TracingAuditSink),
    };

    let executor = SecureExecutor::new(orchestrator)
        .with_audit_sink(audit_sink)
        .with_settings(config.sandbox.clone());

    // =========================================================================
    // Request loop
    // =========================================================================
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let response = match parse_request(&line, &config.sandbox) {
                    Ok(request) => match executor.execute(&request).await {
                        Ok(result) => render_result(&result).unwrap_or_else(|e| render_error(&e)),
                        Err(e) => {
                            tracing::error!(error = %e, tool = %request.tool, "Request could not be executed");
                            render_error(&e)
                        }
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "Rejected malformed request line");
                        render_error(&e)
                    }
                };

                stdout.write_all(response.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received");
                break;
            }
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================
    let report = executor.stop_all().await;
    if report.is_clean() {
        tracing::info!(stopped = report.stopped.len(), "All sandboxes stopped");
    } else {
        for (id, error) in &report.failed {
            tracing::error!(container_id = %id, error = %error, "Failed to stop sandbox");
        }
    }

    if let Some(handle) = metrics_handle {
        tracing::info!(metrics = %handle.render(), "Final metrics snapshot");
    }
    secure_exec_governance::shutdown_tracing();

    Ok(())
}
