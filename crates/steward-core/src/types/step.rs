//! Task step definitions
//!
//! A TaskStep is the atomic unit of work inside an execution plan. Steps are
//! created by the planner and mutated only by the orchestrator.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ReasoningChain;

/// Which agent is responsible for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Planner,
    Executor,
    Monitor,
    Retriever,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Planner => "planner",
            AgentKind::Executor => "executor",
            AgentKind::Monitor => "monitor",
            AgentKind::Retriever => "retriever",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Queued, not yet picked up
    Pending,
    /// Created by the planner, reasoning attached, awaiting execution
    Thinking,
    /// Currently executing
    Executing,
    /// Failed and scheduled for another attempt
    Retrying,
    /// Finished successfully
    Completed,
    /// Last attempt failed; may still retry or replan
    Failed,
    /// Failed with no remaining retry or replan budget
    FailedPermanently,
    /// Intentionally not executed
    Skipped,
}

impl StepStatus {
    /// Whether the step still needs to run.
    pub fn is_runnable(&self) -> bool {
        matches!(
            self,
            StepStatus::Pending | StepStatus::Thinking | StepStatus::Retrying
        )
    }

    /// Whether the step reached a final state.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::FailedPermanently | StepStatus::Skipped
        )
    }
}

/// Error taxonomy for step and backend failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network timeouts, throttling, retryable conflicts
    Transient,
    /// Validation gaps, missing resources, schema mismatches
    Semantic,
    /// Permission denied, quota exhausted
    Unrecoverable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Semantic => "semantic",
            ErrorKind::Unrecoverable => "unrecoverable",
        };
        f.write_str(label)
    }
}

/// A single step in an execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStep {
    /// Unique within the owning plan
    pub step_id: String,
    /// Agent responsible for the step
    pub agent: AgentKind,
    /// Action name from the per-agent vocabulary
    pub action: String,
    pub status: StepStatus,
    /// Opaque step input
    #[serde(default)]
    pub input: Map<String, Value>,
    /// Opaque step output
    #[serde(default)]
    pub output: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    /// Whether a failure of this step should trigger replanning
    #[serde(default)]
    pub needs_replan: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_chain: Option<ReasoningChain>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskStep {
    /// Create a new step in `Thinking` state.
    pub fn new(step_id: impl Into<String>, agent: AgentKind, action: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            step_id: step_id.into(),
            agent,
            action: action.into(),
            status: StepStatus::Thinking,
            input: Map::new(),
            output: Map::new(),
            error: None,
            retry_count: 0,
            needs_replan: false,
            reasoning_chain: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_input(mut self, input: Map<String, Value>) -> Self {
        self.input = input;
        self
    }

    pub fn with_reasoning(mut self, chain: ReasoningChain) -> Self {
        self.reasoning_chain = Some(chain);
        self
    }

    /// Update the step status and bump `updated_at`.
    pub fn set_status(&mut self, status: StepStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Whether a step outcome was a success or a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

/// Structured result of executing a single step.
///
/// Errors are carried inside the outcome; the executor never raises past the
/// orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub status: OutcomeStatus,
    #[serde(default)]
    pub output: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default)]
    pub needs_replan: bool,
}

impl StepOutcome {
    pub fn success(output: Map<String, Value>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            output,
            error: None,
            error_kind: None,
            needs_replan: false,
        }
    }

    pub fn failure(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            output: Map::new(),
            error: Some(error.into()),
            error_kind: Some(kind),
            needs_replan: matches!(kind, ErrorKind::Semantic),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_status_classification() {
        assert!(StepStatus::Pending.is_runnable());
        assert!(StepStatus::Thinking.is_runnable());
        assert!(StepStatus::Retrying.is_runnable());
        assert!(!StepStatus::Completed.is_runnable());
        assert!(StepStatus::Completed.is_settled());
        assert!(StepStatus::FailedPermanently.is_settled());
        assert!(!StepStatus::Failed.is_settled());
    }

    #[test]
    fn test_semantic_failure_requests_replan() {
        let outcome = StepOutcome::failure(ErrorKind::Semantic, "instance type unavailable");
        assert!(outcome.needs_replan);
        let outcome = StepOutcome::failure(ErrorKind::Transient, "throttled");
        assert!(!outcome.needs_replan);
    }
}
