//! OutcomeMonitor - classifies step outcomes.

use async_trait::async_trait;
use tracing::{debug, info};

use steward_core::agent::{MonitorAgent, MonitorDecision};
use steward_core::types::{ErrorKind, MemoryEntry, Resolution, StepOutcome, TaskStep};

/// Outcome classification policy.
///
/// - success → `Accept`
/// - unrecoverable → `Fail`, regardless of retries
/// - transient with retry budget → `Retry`
/// - transient with retries exhausted → `Replan`
/// - semantic → `Replan` when the outcome requests it or similar past
///   failures were resolved by replanning, `Fail` otherwise
///
/// Replan budget enforcement belongs to the orchestrator; the monitor only
/// says what it would take to recover.
pub struct OutcomeMonitor {
    max_retries: u32,
    replan_threshold: usize,
}

impl OutcomeMonitor {
    pub fn new(max_retries: u32, replan_threshold: usize) -> Self {
        Self {
            max_retries,
            replan_threshold,
        }
    }

    fn replan_endorsed_by_memory(&self, recalled: &[MemoryEntry]) -> bool {
        let resolved_by_replan = recalled
            .iter()
            .filter(|m| m.outcome.resolution == Some(Resolution::Replan))
            .count();
        resolved_by_replan >= self.replan_threshold
    }
}

#[async_trait]
impl MonitorAgent for OutcomeMonitor {
    async fn classify(
        &self,
        step: &TaskStep,
        outcome: &StepOutcome,
        recalled: &[MemoryEntry],
    ) -> MonitorDecision {
        if outcome.is_success() {
            return MonitorDecision::Accept;
        }

        let kind = outcome.error_kind.unwrap_or(ErrorKind::Semantic);
        let decision = match kind {
            ErrorKind::Unrecoverable => MonitorDecision::Fail,
            ErrorKind::Transient => {
                if step.retry_count < self.max_retries {
                    MonitorDecision::Retry
                } else {
                    debug!(step_id = %step.step_id, "retry budget exhausted, escalating");
                    MonitorDecision::Replan
                }
            }
            ErrorKind::Semantic => {
                if outcome.needs_replan || self.replan_endorsed_by_memory(recalled) {
                    MonitorDecision::Replan
                } else {
                    MonitorDecision::Fail
                }
            }
        };

        info!(
            step_id = %step.step_id,
            action = %step.action,
            error_kind = %kind,
            retry_count = step.retry_count,
            decision = ?decision,
            "step outcome classified"
        );
        decision
    }
}
