//! Audit records
//!
//! Every plan state transition produces exactly one audit record. Delivery
//! is at-least-once; consumers dedupe by `(plan_id, timestamp, event_type)`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{PlanId, PlanStatus};

/// Audit event vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    IntentSubmitted,
    ValidationPassed,
    ValidationFailed,
    ApprovalRequested,
    Approved,
    Rejected,
    StepStarted,
    StepCompleted,
    StepFailed,
    StepRetried,
    Replan,
    Deployed,
    Failed,
    Paused,
    Restarted,
    Deleted,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::IntentSubmitted => "intent_submitted",
            AuditEventType::ValidationPassed => "validation_passed",
            AuditEventType::ValidationFailed => "validation_failed",
            AuditEventType::ApprovalRequested => "approval_requested",
            AuditEventType::Approved => "approved",
            AuditEventType::Rejected => "rejected",
            AuditEventType::StepStarted => "step_started",
            AuditEventType::StepCompleted => "step_completed",
            AuditEventType::StepFailed => "step_failed",
            AuditEventType::StepRetried => "step_retried",
            AuditEventType::Replan => "replan",
            AuditEventType::Deployed => "deployed",
            AuditEventType::Failed => "failed",
            AuditEventType::Paused => "paused",
            AuditEventType::Restarted => "restarted",
            AuditEventType::Deleted => "deleted",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub plan_id: PlanId,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// User id or `orchestrator` for system-driven transitions
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<PlanStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<PlanStatus>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl AuditRecord {
    pub fn new(plan_id: &str, event_type: AuditEventType, actor: &str) -> Self {
        Self {
            plan_id: plan_id.to_string(),
            timestamp: Utc::now(),
            event_type,
            actor: actor.to_string(),
            before: None,
            after: None,
            metadata: Value::Null,
        }
    }

    pub fn with_transition(mut self, before: PlanStatus, after: PlanStatus) -> Self {
        self.before = Some(before);
        self.after = Some(after);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}
