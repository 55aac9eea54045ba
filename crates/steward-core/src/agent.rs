//! Agent seams
//!
//! Each agent exposes the minimal method set it needs: the planner plans and
//! replans, the executor executes one step, the monitor classifies one
//! outcome. Implementations are in the steward-agents crate; the kernel is
//! composition-only.

use async_trait::async_trait;
use thiserror::Error;

use crate::synthesizer::SynthError;
use crate::types::{
    Constraints, CorrelationId, DeploymentArtifact, DeploymentPlan, Environment, Evidence,
    ExecutionPlan, MemoryEntry, PlanId, StepOutcome, TaskStep,
};

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("synthesis error: {0}")]
    Synthesis(#[from] SynthError),
    #[error("synthesized artifact invalid after retry: {0}")]
    SynthesisInvalid(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Request for an initial plan.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub plan_id: PlanId,
    pub intent: String,
    pub env: Environment,
    pub evidence: Vec<Evidence>,
    pub constraints: Constraints,
    pub correlation_id: CorrelationId,
}

/// Request for a replan after a step failure.
#[derive(Debug, Clone)]
pub struct ReplanRequest {
    pub plan_id: PlanId,
    pub intent: String,
    pub env: Environment,
    pub current_plan: ExecutionPlan,
    pub failed_step: TaskStep,
    pub evidence: Vec<Evidence>,
    pub constraints: Constraints,
    /// 1-based replan attempt; used for fresh step id generation
    pub attempt: u32,
    pub correlation_id: CorrelationId,
}

/// Planner result: the proposed artifact plus the ordered step plan.
#[derive(Debug, Clone)]
pub struct PlannerOutput {
    pub artifact: DeploymentArtifact,
    pub execution_plan: ExecutionPlan,
}

/// Produces and revises execution plans via the ReAct loop.
#[async_trait]
pub trait PlannerAgent: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> Result<PlannerOutput, PlanError>;

    /// Replan after a failure. The returned plan must keep new steps at or
    /// after the failed step's position; the orchestrator merges it over the
    /// completed prefix.
    async fn replan(&self, request: &ReplanRequest) -> Result<PlannerOutput, PlanError>;
}

/// Executes a single step against the deployment backend.
///
/// Failures are reported inside the outcome, never raised.
#[async_trait]
pub trait ExecutorAgent: Send + Sync {
    async fn execute(&self, step: &TaskStep, plan: &DeploymentPlan) -> StepOutcome;
}

/// Monitor classification of a step outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorDecision {
    Accept,
    Retry,
    Replan,
    Fail,
}

/// Classifies step outcomes into retry/replan/fail decisions, informed by
/// recalled memories of similar past failures.
#[async_trait]
pub trait MonitorAgent: Send + Sync {
    async fn classify(
        &self,
        step: &TaskStep,
        outcome: &StepOutcome,
        recalled: &[MemoryEntry],
    ) -> MonitorDecision;
}
