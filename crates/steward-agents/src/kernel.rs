//! AgentKernel - shared agent concerns
//!
//! The kernel is composition-only: it owns no agent state, just the memory
//! store handle and the thresholds that govern recall-driven decisions.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use steward_core::store::MemoryStore;
use steward_core::types::{MemoryEntry, ReasoningChain, ReasoningStep, Resolution};

const REMEMBER_ATTEMPTS: u32 = 3;
const REMEMBER_RETRY_DELAY: Duration = Duration::from_millis(25);

/// Number of unresolved similar failures that vetoes another retry.
const UNRESOLVED_FAILURE_CUTOFF: usize = 3;

/// Shared helpers for memory recall and reasoning-chain assembly.
pub struct AgentKernel {
    memory: Arc<dyn MemoryStore>,
    recall_limit: usize,
    retry_threshold: usize,
}

impl AgentKernel {
    pub fn new(memory: Arc<dyn MemoryStore>, recall_limit: usize, retry_threshold: usize) -> Self {
        Self {
            memory,
            recall_limit,
            retry_threshold,
        }
    }

    /// Recall similar prior memories for an agent. Store errors degrade to an
    /// empty recall; memory is advisory, never load-bearing.
    pub async fn recall(&self, agent: &str, query: &str) -> Vec<MemoryEntry> {
        match self.memory.recall(agent, query, self.recall_limit).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(agent, error = %e, "memory recall failed, continuing without");
                Vec::new()
            }
        }
    }

    /// Persist a memory entry, retrying transient store failures.
    pub async fn remember(&self, entry: MemoryEntry) {
        let agent = entry.agent.clone();
        for attempt in 1..=REMEMBER_ATTEMPTS {
            match self.memory.put(entry.clone()).await {
                Ok(memory_id) => {
                    debug!(agent, memory_id, "memory stored");
                    return;
                }
                Err(e) if attempt < REMEMBER_ATTEMPTS => {
                    warn!(agent, attempt, error = %e, "memory write failed, retrying");
                    tokio::time::sleep(REMEMBER_RETRY_DELAY * attempt).await;
                }
                Err(e) => {
                    warn!(agent, error = %e, "memory write dropped after retries");
                }
            }
        }
    }

    /// Whether past experience endorses retrying `action` after `error`.
    ///
    /// Similar failures that were later resolved by retry endorse another
    /// attempt once the threshold is met. A pile of similar failures with no
    /// resolution at all vetoes the retry. No history defaults to retry.
    pub async fn should_retry_based_on_memory(
        &self,
        agent: &str,
        action: &str,
        error: &str,
    ) -> bool {
        let recalled = self.recall(agent, &format!("{action} {error}")).await;
        if recalled.is_empty() {
            return true;
        }

        let resolved_by_retry = recalled
            .iter()
            .filter(|m| m.outcome.resolution == Some(Resolution::Retry))
            .count();
        if resolved_by_retry >= self.retry_threshold {
            return true;
        }

        let unresolved_failures = recalled
            .iter()
            .filter(|m| !m.outcome.success && m.outcome.resolution.is_none())
            .count();
        unresolved_failures < UNRESOLVED_FAILURE_CUTOFF
    }

    /// Record a generalized rule learned from experience. Semantic entries
    /// never expire and surface as lessons in later planning prompts.
    pub async fn learn_pattern(&self, agent: &str, pattern: &str, lesson: &str) {
        debug!(agent, pattern, "learning pattern");
        self.remember(MemoryEntry::semantic(agent, pattern, lesson))
            .await;
    }

    /// Normalize thoughts into a reasoning chain: confidences clamped to
    /// `[0, 1]`, ordering preserved, overall confidence = minimum.
    pub fn build_reasoning_chain(
        &self,
        agent: &str,
        context: &str,
        thoughts: Vec<ReasoningStep>,
    ) -> ReasoningChain {
        let mut chain = ReasoningChain::new(agent, context);
        for mut step in thoughts {
            step.confidence = step.confidence.clamp(0.0, 1.0);
            chain.push(step);
        }
        chain.recompute_confidence();
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::types::MemoryOutcome;
    use steward_stores::InMemoryMemoryStore;

    fn kernel(store: Arc<InMemoryMemoryStore>) -> AgentKernel {
        AgentKernel::new(store, 5, 2)
    }

    fn failure(agent: &str, event: &str, resolution: Option<Resolution>) -> MemoryEntry {
        MemoryEntry::episodic(agent, event).with_outcome(MemoryOutcome {
            success: false,
            error: Some("throttled".to_string()),
            resolution,
        })
    }

    #[tokio::test]
    async fn test_no_history_defaults_to_retry() {
        let store = Arc::new(InMemoryMemoryStore::new(90));
        assert!(
            kernel(store)
                .should_retry_based_on_memory("executor", "create_endpoint", "throttled")
                .await
        );
    }

    #[tokio::test]
    async fn test_retry_endorsed_by_resolved_failures() {
        let store = Arc::new(InMemoryMemoryStore::new(90));
        for _ in 0..2 {
            store
                .put(failure(
                    "executor",
                    "create_endpoint throttled",
                    Some(Resolution::Retry),
                ))
                .await
                .unwrap();
        }
        assert!(
            kernel(store)
                .should_retry_based_on_memory("executor", "create_endpoint", "throttled")
                .await
        );
    }

    #[tokio::test]
    async fn test_retry_vetoed_by_unresolved_failures() {
        let store = Arc::new(InMemoryMemoryStore::new(90));
        for _ in 0..3 {
            store
                .put(failure("executor", "create_endpoint throttled", None))
                .await
                .unwrap();
        }
        assert!(
            !kernel(store)
                .should_retry_based_on_memory("executor", "create_endpoint", "throttled")
                .await
        );
    }

    #[tokio::test]
    async fn test_learned_patterns_are_recallable() {
        let store = Arc::new(InMemoryMemoryStore::new(90));
        let kernel = kernel(store);
        kernel
            .learn_pattern(
                "planner",
                "prod deployments require approval",
                "park prod plans before executing",
            )
            .await;

        let recalled = kernel.recall("planner", "prod deployments approval").await;
        assert_eq!(recalled.len(), 1);
        assert_eq!(
            recalled[0].lesson.as_deref(),
            Some("park prod plans before executing")
        );
    }

    #[tokio::test]
    async fn test_build_reasoning_chain_normalizes_confidence() {
        let store = Arc::new(InMemoryMemoryStore::new(90));
        let chain = kernel(store).build_reasoning_chain(
            "planner",
            "test",
            vec![
                ReasoningStep::new("a", "r", 0.9),
                ReasoningStep::new("b", "r", 0.7),
            ],
        );
        assert_eq!(chain.steps.len(), 2);
        assert_eq!(chain.overall_confidence, 0.7);
        assert_eq!(chain.steps[0].thought, "a");
    }
}
