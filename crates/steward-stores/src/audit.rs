//! AuditSink implementations
//!
//! `InMemoryAuditSink` is the journal used in development and tests.
//! `BufferedAuditSink` fronts any inner sink with a bounded queue and a
//! dedicated flusher: transient sink unavailability is absorbed by the
//! buffer, and a full buffer back-pressures the caller instead of dropping
//! records.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use steward_core::store::{AuditSink, StoreError};
use steward_core::types::{AuditEventType, AuditRecord};

/// Append-only in-memory journal.
#[derive(Default)]
pub struct InMemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in append order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .read()
            .expect("audit sink lock poisoned")
            .clone()
    }

    /// Records for one plan, in append order.
    pub fn records_for_plan(&self, plan_id: &str) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.plan_id == plan_id)
            .collect()
    }

    /// Event types for one plan, in append order.
    pub fn event_types_for_plan(&self, plan_id: &str) -> Vec<AuditEventType> {
        self.records_for_plan(plan_id)
            .into_iter()
            .map(|r| r.event_type)
            .collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .push(record);
        Ok(())
    }
}

const FLUSH_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Bounded buffer + flusher in front of an inner sink.
pub struct BufferedAuditSink {
    tx: mpsc::Sender<AuditRecord>,
    flusher: JoinHandle<()>,
}

impl BufferedAuditSink {
    /// Spawn the flusher task. `buffer` bounds the in-flight queue; each
    /// record is attempted `retry` additional times before being surfaced as
    /// lost.
    pub fn new(inner: Arc<dyn AuditSink>, buffer: usize, retry: u32) -> Self {
        let (tx, mut rx) = mpsc::channel::<AuditRecord>(buffer.max(1));
        let flusher = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let mut attempt = 0u32;
                loop {
                    match inner.append(record.clone()).await {
                        Ok(()) => break,
                        Err(e) if attempt < retry => {
                            attempt += 1;
                            warn!(
                                plan_id = %record.plan_id,
                                event_type = %record.event_type,
                                attempt,
                                error = %e,
                                "audit append failed, retrying"
                            );
                            tokio::time::sleep(FLUSH_RETRY_DELAY * attempt).await;
                        }
                        Err(e) => {
                            error!(
                                plan_id = %record.plan_id,
                                event_type = %record.event_type,
                                error = %e,
                                "audit record lost after retries"
                            );
                            break;
                        }
                    }
                }
            }
        });
        Self { tx, flusher }
    }

    /// Stop accepting records and wait for the queue to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.flusher.await {
            error!(error = %e, "audit flusher terminated abnormally");
        }
    }
}

#[async_trait]
impl AuditSink for BufferedAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<(), StoreError> {
        // send().await blocks while the buffer is full: transitions
        // back-pressure rather than drop audit records.
        self.tx
            .send(record)
            .await
            .map_err(|_| StoreError::Unavailable("audit flusher stopped".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn record(event_type: AuditEventType) -> AuditRecord {
        AuditRecord::new("plan-1", event_type, "orchestrator")
    }

    #[tokio::test]
    async fn test_in_memory_sink_preserves_order() {
        let sink = InMemoryAuditSink::new();
        sink.append(record(AuditEventType::IntentSubmitted))
            .await
            .unwrap();
        sink.append(record(AuditEventType::ValidationPassed))
            .await
            .unwrap();
        assert_eq!(
            sink.event_types_for_plan("plan-1"),
            vec![
                AuditEventType::IntentSubmitted,
                AuditEventType::ValidationPassed
            ]
        );
    }

    #[tokio::test]
    async fn test_buffered_sink_flushes_to_inner() {
        let inner = Arc::new(InMemoryAuditSink::new());
        let buffered = BufferedAuditSink::new(inner.clone(), 16, 2);
        buffered
            .append(record(AuditEventType::IntentSubmitted))
            .await
            .unwrap();
        buffered
            .append(record(AuditEventType::Deployed))
            .await
            .unwrap();
        buffered.shutdown().await;

        assert_eq!(inner.records_for_plan("plan-1").len(), 2);
    }

    struct FlakySink {
        inner: InMemoryAuditSink,
        failures_remaining: AtomicU32,
    }

    #[async_trait]
    impl AuditSink for FlakySink {
        async fn append(&self, record: AuditRecord) -> Result<(), StoreError> {
            if self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Unavailable("sink flapping".to_string()));
            }
            self.inner.append(record).await
        }
    }

    #[tokio::test]
    async fn test_buffered_sink_retries_transient_failures() {
        let flaky = Arc::new(FlakySink {
            inner: InMemoryAuditSink::new(),
            failures_remaining: AtomicU32::new(2),
        });
        let buffered = BufferedAuditSink::new(flaky.clone(), 16, 5);
        buffered
            .append(record(AuditEventType::Deployed))
            .await
            .unwrap();
        buffered.shutdown().await;

        assert_eq!(flaky.inner.records_for_plan("plan-1").len(), 1);
    }

    #[tokio::test]
    async fn test_append_after_shutdown_is_unavailable() {
        let inner = Arc::new(InMemoryAuditSink::new());
        let buffered = BufferedAuditSink::new(inner, 4, 1);
        let tx = buffered.tx.clone();
        buffered.shutdown().await;
        assert!(tx.send(record(AuditEventType::Deployed)).await.is_err());
    }
}
