//! Audit sinks for secure-execution events.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use secure_exec_core::{AuditEvent, AuditOutcome, AuditSink, Error, Result};

/// Filter for querying recorded events.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub session_id: Option<String>,
    pub tool: Option<String>,
    pub outcome: Option<AuditOutcome>,
    pub limit: Option<usize>,
}

/// In-memory audit sink for testing and inspection.
pub struct InMemoryAuditSink {
    events: std::sync::Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// All recorded events, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Query events with optional filters.
    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEvent> {
        let events = self.events.lock().unwrap();
        let mut result: Vec<AuditEvent> = events
            .iter()
            .filter(|e| {
                filter
                    .session_id
                    .as_ref()
                    .map_or(true, |s| &e.context.session_id == s)
                    && filter.tool.as_ref().map_or(true, |t| &e.tool == t)
                    && filter.outcome.map_or(true, |o| e.outcome == o)
            })
            .cloned()
            .collect();

        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }

        result
    }
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Sink that writes each event as a structured log line.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        let payload = serde_json::to_string(&event)?;
        tracing::info!(
            target: "secure_exec::audit",
            outcome = %event.outcome,
            tool = %event.tool,
            session_id = %event.context.session_id,
            request_id = %event.context.request_id,
            container_id = ?event.container_id,
            event = %payload,
            "Audit event"
        );
        Ok(())
    }
}

/// Sink appending one JSON document per line to a file.
pub struct FileAuditSink {
    path: PathBuf,
    // Serializes appends so concurrent events never interleave.
    write_lock: tokio::sync::Mutex<()>,
}

impl FileAuditSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                Error::audit(format!(
                    "Failed to open audit log {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
