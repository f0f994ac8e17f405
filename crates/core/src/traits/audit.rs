//! Audit sink traits.

use async_trait::async_trait;

use crate::error::Result;
use crate::events::AuditEvent;

/// Consumer of audit events.
///
/// The executor holds zero or one sink. A failing sink is logged by the
/// caller and never affects the execution result.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one event.
    async fn record(&self, event: AuditEvent) -> Result<()>;
}

/// Sink that discards every event.
pub struct NoOpAuditSink;

#[async_trait]
impl AuditSink for NoOpAuditSink {
    async fn record(&self, _event: AuditEvent) -> Result<()> {
        Ok(())
    }
}
