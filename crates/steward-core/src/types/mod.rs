//! Type definitions shared across the Steward workspace.

mod artifact;
mod audit;
mod evidence;
mod memory;
mod plan;
mod reasoning;
mod step;

pub use artifact::{is_valid_resource_name, Constraints, DeploymentArtifact, Environment};
pub use audit::{AuditEventType, AuditRecord};
pub use evidence::{sort_evidence, Evidence};
pub use memory::{MemoryContext, MemoryEntry, MemoryKind, MemoryOutcome, Resolution};
pub use plan::{
    Approval, ApprovalDecision, DeploymentPlan, ExecutionPlan, PendingApproval, PlanId,
    PlanStatus, PlanSummary,
};
pub use reasoning::{ReasoningChain, ReasoningStep};
pub use step::{AgentKind, ErrorKind, OutcomeStatus, StepOutcome, StepStatus, TaskStep};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Correlation ID threaded through one submit/execute pipeline run.
///
/// Propagated into agent requests and tracing fields so a single intent can
/// be followed across planner, executor, monitor and store writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    /// Generate a fresh correlation ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
