//! PlanStore implementations

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use steward_core::store::{PlanFilter, PlanStore, StoreError};
use steward_core::types::DeploymentPlan;

/// In-memory implementation for development and testing.
pub struct InMemoryPlanStore {
    plans: RwLock<HashMap<String, DeploymentPlan>>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self {
            plans: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPlanStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlanStore for InMemoryPlanStore {
    async fn put(&self, plan: &DeploymentPlan) -> Result<(), StoreError> {
        let mut plans = self
            .plans
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        plans.insert(plan.plan_id.clone(), plan.clone());
        Ok(())
    }

    async fn get(&self, plan_id: &str) -> Result<Option<DeploymentPlan>, StoreError> {
        let plans = self
            .plans
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(plans.get(plan_id).cloned())
    }

    async fn list(&self, filter: &PlanFilter) -> Result<Vec<DeploymentPlan>, StoreError> {
        let plans = self
            .plans
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let mut matching: Vec<DeploymentPlan> = plans
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        // Newest first; plan_id tie-break keeps listings stable.
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.plan_id.cmp(&b.plan_id))
        });
        Ok(matching)
    }

    async fn remove(&self, plan_id: &str) -> Result<bool, StoreError> {
        let mut plans = self
            .plans
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(plans.remove(plan_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::types::{Constraints, Environment, PlanStatus};

    fn plan(user: &str) -> DeploymentPlan {
        DeploymentPlan::new(user, "deploy llama", Environment::Staging, Constraints::default())
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = InMemoryPlanStore::new();
        let plan = plan("alice");
        store.put(&plan).await.unwrap();

        let loaded = store.get(&plan.plan_id).await.unwrap().unwrap();
        assert_eq!(loaded.plan_id, plan.plan_id);
        assert_eq!(loaded.intent, plan.intent);
        assert_eq!(loaded.user_id, plan.user_id);
        assert_eq!(loaded.status, plan.status);
    }

    #[tokio::test]
    async fn test_put_is_last_writer_wins() {
        let store = InMemoryPlanStore::new();
        let mut plan = plan("alice");
        store.put(&plan).await.unwrap();
        plan.set_status(PlanStatus::Validating);
        store.put(&plan).await.unwrap();

        let loaded = store.get(&plan.plan_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PlanStatus::Validating);
    }

    #[tokio::test]
    async fn test_list_excludes_soft_deleted_by_default() {
        let store = InMemoryPlanStore::new();
        let mut deleted = plan("alice");
        deleted.status = PlanStatus::Deleted;
        store.put(&deleted).await.unwrap();
        store.put(&plan("bob")).await.unwrap();

        let listed = store.list(&PlanFilter::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].user_id, "bob");

        let all = store
            .list(&PlanFilter {
                include_deleted: true,
                ..PlanFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_list_filters_by_status_and_user() {
        let store = InMemoryPlanStore::new();
        let mut deploying = plan("alice");
        deploying.status = PlanStatus::Deploying;
        store.put(&deploying).await.unwrap();
        store.put(&plan("alice")).await.unwrap();

        let by_status = store
            .list(&PlanFilter::by_status(PlanStatus::Deploying))
            .await
            .unwrap();
        assert_eq!(by_status.len(), 1);

        let by_user = store
            .list(&PlanFilter {
                user_id: Some("alice".to_string()),
                ..PlanFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_user.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_reports_existence() {
        let store = InMemoryPlanStore::new();
        let plan = plan("alice");
        store.put(&plan).await.unwrap();
        assert!(store.remove(&plan.plan_id).await.unwrap());
        assert!(!store.remove(&plan.plan_id).await.unwrap());
        assert!(store.get(&plan.plan_id).await.unwrap().is_none());
    }
}
