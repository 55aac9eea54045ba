//! MemoryStore implementations

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use steward_core::retriever::EmbeddingClient;
use steward_core::similarity::{cosine, token_overlap};
use steward_core::store::{MemoryStore, StoreError};
use steward_core::types::{MemoryEntry, MemoryKind};

/// In-memory implementation with TTL expiry and similarity recall.
///
/// Episodic entries expire after the configured TTL; semantic entries are
/// retained until explicitly removed. Recall uses embedding cosine when both
/// an embedder and a stored embedding are available, token overlap otherwise.
pub struct InMemoryMemoryStore {
    entries: RwLock<Vec<MemoryEntry>>,
    embedder: Option<Arc<dyn EmbeddingClient>>,
    ttl_days: i64,
}

impl InMemoryMemoryStore {
    pub fn new(ttl_days: i64) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            embedder: None,
            ttl_days,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingClient>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    fn is_expired(&self, entry: &MemoryEntry, now: DateTime<Utc>) -> bool {
        entry.kind == MemoryKind::Episodic
            && self.ttl_days > 0
            && entry.timestamp + Duration::days(self.ttl_days) < now
    }

    /// Drop expired episodic entries; returns the removed count.
    pub fn prune_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().expect("memory store lock poisoned");
        let before = entries.len();
        entries.retain(|e| !self.is_expired(e, now));
        before - entries.len()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn put(&self, mut entry: MemoryEntry) -> Result<String, StoreError> {
        if entry.memory_id.is_empty() {
            entry.memory_id = uuid::Uuid::new_v4().to_string();
        }
        let memory_id = entry.memory_id.clone();
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        entries.push(entry);
        Ok(memory_id)
    }

    async fn recall(
        &self,
        agent: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, StoreError> {
        let now = Utc::now();
        let candidates: Vec<MemoryEntry> = {
            let entries = self
                .entries
                .read()
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            entries
                .iter()
                .filter(|e| e.agent == agent && !self.is_expired(e, now))
                .cloned()
                .collect()
        };

        let query_embedding = match &self.embedder {
            Some(embedder) => match embedder.embed(query).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    debug!(error = %e, "query embedding failed, falling back to token overlap");
                    None
                }
            },
            None => None,
        };

        let mut scored: Vec<(f32, MemoryEntry)> = candidates
            .into_iter()
            .map(|entry| {
                let score = match (&query_embedding, &entry.embedding) {
                    (Some(query_vec), Some(entry_vec)) => cosine(query_vec, entry_vec),
                    _ => token_overlap(query, &entry.recall_text()),
                };
                (score, entry)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.timestamp.cmp(&a.1.timestamp))
        });

        debug!(agent, query, candidates = scored.len(), "memory recall");
        Ok(scored.into_iter().take(limit).map(|(_, e)| e).collect())
    }

    async fn list(
        &self,
        agent: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MemoryEntry>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let mut matching: Vec<MemoryEntry> = entries
            .iter()
            .filter(|e| e.agent == agent)
            .filter(|e| since.map_or(true, |cutoff| e.timestamp >= cutoff))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(matching)
    }

    async fn remove_for_plan(&self, plan_id: &str) -> Result<usize, StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let before = entries.len();
        entries.retain(|e| e.context.plan_id.as_deref() != Some(plan_id));
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::types::{MemoryContext, MemoryOutcome};

    fn failure_entry(agent: &str, event: &str, plan_id: Option<&str>) -> MemoryEntry {
        MemoryEntry::episodic(agent, event)
            .with_context(MemoryContext {
                plan_id: plan_id.map(str::to_string),
                ..MemoryContext::default()
            })
            .with_outcome(MemoryOutcome {
                success: false,
                error: Some("capacity".to_string()),
                resolution: None,
            })
    }

    #[tokio::test]
    async fn test_put_assigns_memory_id() {
        let store = InMemoryMemoryStore::new(90);
        let id = store
            .put(MemoryEntry::episodic("planner", "planned deployment"))
            .await
            .unwrap();
        assert!(!id.is_empty());
    }

    #[tokio::test]
    async fn test_recall_ranks_by_token_overlap() {
        let store = InMemoryMemoryStore::new(90);
        store
            .put(MemoryEntry::episodic(
                "executor",
                "create_endpoint failed capacity exceeded",
            ))
            .await
            .unwrap();
        store
            .put(MemoryEntry::episodic("executor", "configure monitoring ok"))
            .await
            .unwrap();

        let recalled = store
            .recall("executor", "create_endpoint capacity", 5)
            .await
            .unwrap();
        assert_eq!(recalled.len(), 2);
        assert!(recalled[0].event.contains("create_endpoint"));
    }

    #[tokio::test]
    async fn test_recall_filters_by_agent_and_limit() {
        let store = InMemoryMemoryStore::new(90);
        for i in 0..5 {
            store
                .put(MemoryEntry::episodic("planner", format!("planned {i}")))
                .await
                .unwrap();
        }
        store
            .put(MemoryEntry::episodic("executor", "planned 0"))
            .await
            .unwrap();

        let recalled = store.recall("planner", "planned", 3).await.unwrap();
        assert_eq!(recalled.len(), 3);
        assert!(recalled.iter().all(|e| e.agent == "planner"));
    }

    #[tokio::test]
    async fn test_expired_episodic_entries_are_not_recalled() {
        let store = InMemoryMemoryStore::new(30);
        let mut old = MemoryEntry::episodic("planner", "planned llama deployment");
        old.timestamp = Utc::now() - Duration::days(45);
        store.put(old).await.unwrap();

        let mut old_semantic =
            MemoryEntry::semantic("planner", "prod approval", "always park prod");
        old_semantic.timestamp = Utc::now() - Duration::days(400);
        store.put(old_semantic).await.unwrap();

        let recalled = store.recall("planner", "planned prod", 5).await.unwrap();
        assert_eq!(recalled.len(), 1);
        assert_eq!(recalled[0].kind, MemoryKind::Semantic);
    }

    #[tokio::test]
    async fn test_remove_for_plan_only_touches_referencing_entries() {
        let store = InMemoryMemoryStore::new(90);
        store
            .put(failure_entry("executor", "failed once", Some("plan-1")))
            .await
            .unwrap();
        store
            .put(failure_entry("executor", "failed twice", Some("plan-1")))
            .await
            .unwrap();
        store
            .put(failure_entry("executor", "unrelated", Some("plan-2")))
            .await
            .unwrap();

        let removed = store.remove_for_plan("plan-1").await.unwrap();
        assert_eq!(removed, 2);
        let remaining = store.list("executor", None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].context.plan_id.as_deref(), Some("plan-2"));
    }

    #[tokio::test]
    async fn test_prune_expired_counts_removals() {
        let store = InMemoryMemoryStore::new(10);
        let mut old = MemoryEntry::episodic("monitor", "stale");
        old.timestamp = Utc::now() - Duration::days(20);
        store.put(old).await.unwrap();
        store
            .put(MemoryEntry::episodic("monitor", "fresh"))
            .await
            .unwrap();

        assert_eq!(store.prune_expired(), 1);
        assert_eq!(store.list("monitor", None).await.unwrap().len(), 1);
    }
}
