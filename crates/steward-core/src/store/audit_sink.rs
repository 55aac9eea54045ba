//! AuditSink - append-only transition log trait

use async_trait::async_trait;

use super::StoreError;
use crate::types::AuditRecord;

/// Append-only log of plan state transitions.
///
/// Delivery is at-least-once: consumers must tolerate duplicates keyed by
/// `(plan_id, timestamp, event_type)`.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<(), StoreError>;
}
