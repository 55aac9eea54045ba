//! MemoryStore - agent memory persistence trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::StoreError;
use crate::types::MemoryEntry;

/// Persistence and similarity recall for agent memories.
///
/// Entries are never mutated after write. `put` must be atomic per entry;
/// recall ranks by embedding similarity when embeddings are present and by
/// token overlap otherwise.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Store an entry and return its assigned memory id.
    async fn put(&self, entry: MemoryEntry) -> Result<String, StoreError>;

    /// Recall up to `limit` entries for `agent`, ranked by similarity to
    /// `query`.
    async fn recall(
        &self,
        agent: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, StoreError>;

    /// List entries for an agent, oldest first (diagnostics).
    async fn list(
        &self,
        agent: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MemoryEntry>, StoreError>;

    /// Remove entries whose context references the plan; returns the count.
    async fn remove_for_plan(&self, plan_id: &str) -> Result<usize, StoreError>;
}
