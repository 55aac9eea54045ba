//! PlanStore - durable plan persistence trait

use async_trait::async_trait;

use super::StoreError;
use crate::types::{DeploymentPlan, PlanStatus};

/// Listing filter. Soft-deleted plans are excluded unless requested.
#[derive(Debug, Clone, Default)]
pub struct PlanFilter {
    pub status: Option<PlanStatus>,
    pub user_id: Option<String>,
    pub include_deleted: bool,
}

impl PlanFilter {
    pub fn by_status(status: PlanStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn matches(&self, plan: &DeploymentPlan) -> bool {
        if !self.include_deleted && plan.status == PlanStatus::Deleted {
            return false;
        }
        if let Some(status) = self.status {
            if plan.status != status {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            if &plan.user_id != user_id {
                return false;
            }
        }
        true
    }
}

/// Durable persistence of plans keyed by id.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Persist a plan; last-writer-wins on `plan_id`.
    async fn put(&self, plan: &DeploymentPlan) -> Result<(), StoreError>;

    async fn get(&self, plan_id: &str) -> Result<Option<DeploymentPlan>, StoreError>;

    /// List plans matching the filter, newest first.
    async fn list(&self, filter: &PlanFilter) -> Result<Vec<DeploymentPlan>, StoreError>;

    /// Remove the plan row; returns whether it existed.
    async fn remove(&self, plan_id: &str) -> Result<bool, StoreError>;
}
