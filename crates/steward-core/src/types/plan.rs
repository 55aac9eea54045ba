//! Deployment plan definitions
//!
//! DeploymentPlan is the durable aggregate; ExecutionPlan is the ordered
//! step sequence the orchestrator drives. Both are mutated only by the
//! orchestrator under the plan's lock.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    Constraints, DeploymentArtifact, Environment, Evidence, ReasoningChain, StepStatus, TaskStep,
};

/// Type alias for plan IDs (UUID v4 strings).
pub type PlanId = String;

/// Deployment plan state machine.
///
/// Legal transitions are encoded in [`PlanStatus::can_transition_to`]; any
/// other transition is rejected loudly by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Created,
    Validating,
    ValidationFailed,
    AwaitingApproval,
    Approved,
    Rejected,
    Deploying,
    Deployed,
    Failed,
    Paused,
    Deleted,
}

impl PlanStatus {
    /// Terminal states with no forward progress of any kind.
    ///
    /// `Deployed`, `Failed` and `Paused` are not listed: they can re-enter
    /// `Deploying` through an explicit restart.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlanStatus::ValidationFailed | PlanStatus::Rejected | PlanStatus::Deleted
        )
    }

    /// States from which `restart` is legal.
    pub fn is_restartable(&self) -> bool {
        matches!(
            self,
            PlanStatus::Paused | PlanStatus::Failed | PlanStatus::Deployed
        )
    }

    /// States from which `pause` is legal.
    pub fn is_pausable(&self) -> bool {
        matches!(self, PlanStatus::Deploying | PlanStatus::Deployed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: PlanStatus) -> bool {
        use PlanStatus::*;
        if next == Deleted {
            return *self != Deleted;
        }
        matches!(
            (self, next),
            (Created, Validating)
                | (Validating, ValidationFailed)
                | (Validating, AwaitingApproval)
                | (Validating, Deploying)
                | (AwaitingApproval, Approved)
                | (AwaitingApproval, Rejected)
                | (Approved, Deploying)
                | (Deploying, Deployed)
                | (Deploying, Failed)
                | (Deploying, Paused)
                | (Paused, Deploying)
                | (Failed, Deploying)
                | (Deployed, Paused)
                | (Deployed, Deploying)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Created => "created",
            PlanStatus::Validating => "validating",
            PlanStatus::ValidationFailed => "validation_failed",
            PlanStatus::AwaitingApproval => "awaiting_approval",
            PlanStatus::Approved => "approved",
            PlanStatus::Rejected => "rejected",
            PlanStatus::Deploying => "deploying",
            PlanStatus::Deployed => "deployed",
            PlanStatus::Failed => "failed",
            PlanStatus::Paused => "paused",
            PlanStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approval decision recorded on a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

/// A recorded approval decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub approver: String,
    pub decision: ApprovalDecision,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The ordered step sequence realizing an artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub plan_id: PlanId,
    pub steps: Vec<TaskStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_chain: Option<ReasoningChain>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionPlan {
    pub fn new(plan_id: impl Into<PlanId>, steps: Vec<TaskStep>) -> Self {
        let now = Utc::now();
        Self {
            plan_id: plan_id.into(),
            steps,
            reasoning_chain: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_reasoning(mut self, chain: ReasoningChain) -> Self {
        self.reasoning_chain = Some(chain);
        self
    }

    /// Index of the next step that still needs to run.
    pub fn next_runnable(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.status.is_runnable())
    }

    /// Steps that finished successfully, in plan order.
    pub fn completed_steps(&self) -> Vec<&TaskStep> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .collect()
    }

    /// Whether every step is settled successfully (completed or skipped).
    pub fn is_complete(&self) -> bool {
        !self.steps.is_empty()
            && self
                .steps
                .iter()
                .all(|s| matches!(s.status, StepStatus::Completed | StepStatus::Skipped))
    }

    /// Merge a replanned step sequence into this plan.
    ///
    /// Completed (and skipped) prefix steps are retained verbatim with their
    /// ids and outputs; every non-settled step is discarded and replaced by
    /// the replacement's suffix, which carries fresh step ids.
    pub fn merge_replanned(&self, replacement: ExecutionPlan) -> ExecutionPlan {
        let retained: Vec<TaskStep> = self
            .steps
            .iter()
            .take_while(|s| matches!(s.status, StepStatus::Completed | StepStatus::Skipped))
            .cloned()
            .collect();
        let mut steps = retained;
        let keep_from = steps.len().min(replacement.steps.len());
        steps.extend(replacement.steps.into_iter().skip(keep_from));

        let mut reasoning_chain = self.reasoning_chain.clone();
        // A replan appends its reasoning to the existing chain instead of
        // replacing it.
        // (the planner records the replan entry on the replacement chain)
        if let (Some(existing), Some(new_chain)) = (&mut reasoning_chain, &replacement.reasoning_chain)
        {
            existing.steps.extend(new_chain.steps.iter().cloned());
            existing.recompute_confidence();
        } else if reasoning_chain.is_none() {
            reasoning_chain = replacement.reasoning_chain;
        }

        ExecutionPlan {
            plan_id: self.plan_id.clone(),
            steps,
            reasoning_chain,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }
}

/// The durable deployment plan aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub plan_id: PlanId,
    pub user_id: String,
    /// Original natural-language intent
    pub intent: String,
    pub env: Environment,
    pub status: PlanStatus,
    /// Synthesized configuration; absent until planning succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<DeploymentArtifact>,
    /// Top evidence snippets used in planning
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub validation_errors: Vec<String>,
    /// Non-fatal findings (retrieval timeouts, guardrail warnings)
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_plan: Option<ExecutionPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<Approval>,
    #[serde(default)]
    pub replan_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentPlan {
    /// Create a new plan in `Created` state.
    pub fn new(
        user_id: impl Into<String>,
        intent: impl Into<String>,
        env: Environment,
        constraints: Constraints,
    ) -> Self {
        let now = Utc::now();
        Self {
            plan_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            intent: intent.into(),
            env,
            status: PlanStatus::Created,
            artifact: None,
            evidence: Vec::new(),
            constraints,
            validation_errors: Vec::new(),
            warnings: Vec::new(),
            execution_plan: None,
            approval: None,
            replan_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the status and bump `updated_at`.
    pub fn set_status(&mut self, status: PlanStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Error message of the last permanently failed step, if any.
    pub fn last_step_error(&self) -> Option<&str> {
        self.execution_plan.as_ref().and_then(|plan| {
            plan.steps
                .iter()
                .rev()
                .find(|s| s.status == StepStatus::FailedPermanently)
                .and_then(|s| s.error.as_deref())
        })
    }
}

/// Listing projection of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub plan_id: PlanId,
    pub status: PlanStatus,
    pub user_id: String,
    pub intent: String,
    pub env: Environment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost_usd_per_hour: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Projection of a plan waiting for an approval decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    pub plan_id: PlanId,
    pub user_id: String,
    pub intent: String,
    pub env: Environment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost_usd_per_hour: Option<f64>,
    pub requested_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentKind;

    fn step(id: &str, status: StepStatus) -> TaskStep {
        let mut s = TaskStep::new(id, AgentKind::Executor, "create_model");
        s.status = status;
        s
    }

    #[test]
    fn test_status_transition_table() {
        use PlanStatus::*;
        assert!(Created.can_transition_to(Validating));
        assert!(Validating.can_transition_to(ValidationFailed));
        assert!(Validating.can_transition_to(AwaitingApproval));
        assert!(Validating.can_transition_to(Deploying));
        assert!(AwaitingApproval.can_transition_to(Approved));
        assert!(AwaitingApproval.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Deploying));
        assert!(Deploying.can_transition_to(Deployed));
        assert!(Deploying.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Deploying));
        assert!(Failed.can_transition_to(Deploying));
        assert!(Deployed.can_transition_to(Deploying));

        assert!(!Created.can_transition_to(Deploying));
        assert!(!Deployed.can_transition_to(AwaitingApproval));
        assert!(!Rejected.can_transition_to(Deploying));
        assert!(!ValidationFailed.can_transition_to(Validating));

        // Soft delete is reachable from everything except deleted itself.
        assert!(AwaitingApproval.can_transition_to(Deleted));
        assert!(Deployed.can_transition_to(Deleted));
        assert!(!Deleted.can_transition_to(Deleted));
    }

    #[test]
    fn test_merge_replanned_preserves_completed_prefix() {
        let original = ExecutionPlan::new(
            "p1",
            vec![
                step("p1-step-1", StepStatus::Completed),
                step("p1-step-2", StepStatus::Completed),
                step("p1-step-3", StepStatus::Failed),
                step("p1-step-4", StepStatus::Thinking),
            ],
        );
        let replacement = ExecutionPlan::new(
            "p1",
            vec![
                step("p1-r1-step-1", StepStatus::Thinking),
                step("p1-r1-step-2", StepStatus::Thinking),
                step("p1-r1-step-3", StepStatus::Thinking),
                step("p1-r1-step-4", StepStatus::Thinking),
            ],
        );

        let merged = original.merge_replanned(replacement);
        assert_eq!(merged.steps.len(), 4);
        assert_eq!(merged.steps[0].step_id, "p1-step-1");
        assert_eq!(merged.steps[0].status, StepStatus::Completed);
        assert_eq!(merged.steps[1].step_id, "p1-step-2");
        assert_eq!(merged.steps[2].step_id, "p1-r1-step-3");
        assert_eq!(merged.steps[3].step_id, "p1-r1-step-4");
    }

    #[test]
    fn test_next_runnable_skips_settled_steps() {
        let plan = ExecutionPlan::new(
            "p1",
            vec![
                step("s1", StepStatus::Completed),
                step("s2", StepStatus::Skipped),
                step("s3", StepStatus::Thinking),
            ],
        );
        assert_eq!(plan.next_runnable(), Some(2));
        assert!(!plan.is_complete());
    }

    #[test]
    fn test_is_complete_requires_all_settled_success() {
        let plan = ExecutionPlan::new(
            "p1",
            vec![step("s1", StepStatus::Completed), step("s2", StepStatus::Skipped)],
        );
        assert!(plan.is_complete());
        let empty = ExecutionPlan::new("p1", vec![]);
        assert!(!empty.is_complete());
    }
}
