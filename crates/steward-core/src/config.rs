//! Orchestrator configuration
//!
//! All knobs live in one immutable value passed at orchestrator
//! construction. No process-wide mutable state.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::types::Environment;

/// Per-environment deployment policy.
#[derive(Debug, Clone)]
pub struct EnvPolicy {
    /// Allowed instance types; `None` means any known type
    pub allowed_instance_types: Option<Vec<String>>,
    /// Hard budget cap in USD per hour
    pub max_budget_usd_per_hour: f64,
    pub min_instance_count: u32,
    pub max_instance_count: u32,
}

/// Guardrail tables: pricing, per-env policies and the approval rule inputs.
#[derive(Debug, Clone)]
pub struct GuardrailConfig {
    /// Static hourly price per instance type
    pub instance_pricing: BTreeMap<String, f64>,
    pub env_policies: BTreeMap<Environment, EnvPolicy>,
    /// Estimated cost above this always requires approval
    pub approval_cost_threshold: f64,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        let instance_pricing = BTreeMap::from([
            ("ml.m5.large".to_string(), 0.115),
            ("ml.m5.xlarge".to_string(), 0.230),
            ("ml.m5.2xlarge".to_string(), 0.460),
            ("ml.g5.xlarge".to_string(), 1.408),
            ("ml.g5.2xlarge".to_string(), 2.816),
            ("ml.g5.4xlarge".to_string(), 5.632),
            ("ml.g5.12xlarge".to_string(), 16.896),
            ("ml.p5.48xlarge".to_string(), 71.296),
        ]);

        let env_policies = BTreeMap::from([
            (
                Environment::Dev,
                EnvPolicy {
                    allowed_instance_types: Some(vec!["ml.m5.large".to_string()]),
                    max_budget_usd_per_hour: 2.0,
                    min_instance_count: 1,
                    max_instance_count: 2,
                },
            ),
            (
                Environment::Staging,
                EnvPolicy {
                    allowed_instance_types: Some(vec![
                        "ml.m5.large".to_string(),
                        "ml.m5.xlarge".to_string(),
                    ]),
                    max_budget_usd_per_hour: 15.0,
                    min_instance_count: 1,
                    max_instance_count: 4,
                },
            ),
            (
                Environment::Prod,
                EnvPolicy {
                    allowed_instance_types: None,
                    max_budget_usd_per_hour: 50.0,
                    min_instance_count: 2,
                    max_instance_count: 4,
                },
            ),
        ]);

        Self {
            instance_pricing,
            env_policies,
            approval_cost_threshold: 20.0,
        }
    }
}

/// Orchestrator knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Max replans per plan before terminal failure
    pub max_replans: u32,
    /// Max retries per step before escalation
    pub max_retries_per_step: u32,
    /// Evidence fetched for the initial planning pass
    pub top_k_initial: usize,
    /// Evidence fetched for iterative per-step retrieval
    pub top_k_iterative: usize,
    pub retrieve_timeout: Duration,
    pub synthesize_timeout: Duration,
    pub backend_timeout: Duration,
    /// Total budget for endpoint verification polling
    pub verify_timeout: Duration,
    pub verify_poll: Duration,
    /// Backoff base for step retries
    pub backoff_base: Duration,
    /// Backoff cap for step retries
    pub backoff_max: Duration,
    /// Attempts per audit record before it is surfaced as lost
    pub audit_retry: u32,
    /// Bounded audit buffer; full buffer back-pressures transitions
    pub audit_buffer: usize,
    pub memory_recall_limit: usize,
    pub memory_ttl_days: i64,
    /// Similar retry-resolved failures needed to endorse a retry
    pub memory_retry_threshold: usize,
    /// Similar replan-resolved failures needed to endorse a replan
    pub memory_replan_threshold: usize,
    /// Parallel execution workers across distinct plans
    pub worker_pool_size: usize,
    /// When false (default) backend mutations are logged, not performed
    pub execute_real: bool,
    pub guardrails: GuardrailConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_replans: 3,
            max_retries_per_step: 3,
            top_k_initial: 3,
            top_k_iterative: 2,
            retrieve_timeout: Duration::from_secs(10),
            synthesize_timeout: Duration::from_secs(30),
            backend_timeout: Duration::from_secs(60),
            verify_timeout: Duration::from_secs(15 * 60),
            verify_poll: Duration::from_secs(15),
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            audit_retry: 5,
            audit_buffer: 256,
            memory_recall_limit: 5,
            memory_ttl_days: 90,
            memory_retry_threshold: 2,
            memory_replan_threshold: 2,
            worker_pool_size: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            execute_real: false,
            guardrails: GuardrailConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_env_budgets() {
        let config = GuardrailConfig::default();
        assert_eq!(
            config.env_policies[&Environment::Dev].max_budget_usd_per_hour,
            2.0
        );
        assert_eq!(
            config.env_policies[&Environment::Staging].max_budget_usd_per_hour,
            15.0
        );
        assert_eq!(
            config.env_policies[&Environment::Prod].max_budget_usd_per_hour,
            50.0
        );
        assert_eq!(
            config.env_policies[&Environment::Prod].min_instance_count,
            2
        );
    }

    #[test]
    fn test_default_knobs_match_contract() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_replans, 3);
        assert_eq!(config.max_retries_per_step, 3);
        assert_eq!(config.backoff_base, Duration::from_millis(500));
        assert_eq!(config.backoff_max, Duration::from_secs(30));
        assert!(!config.execute_real);
    }
}
