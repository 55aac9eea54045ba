//! Guardrail validation
//!
//! A pure validator over `(artifact, env, constraints)` plus the static
//! pricing and policy tables. Identical inputs always produce identical
//! output, so validation results can be replayed and audited.

use crate::config::{EnvPolicy, GuardrailConfig};
use crate::types::{is_valid_resource_name, Constraints, DeploymentArtifact, Environment};

/// Price assumed for instance types missing from the table.
const UNKNOWN_INSTANCE_PRICE: f64 = 1.0;

/// Fraction of the user budget above which a proximity warning is emitted.
const BUDGET_WARN_RATIO: f64 = 0.8;

/// Result of a guardrail validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Declarative rule evaluation over deployment artifacts.
#[derive(Debug, Clone)]
pub struct Guardrails {
    config: GuardrailConfig,
}

impl Guardrails {
    pub fn new(config: GuardrailConfig) -> Self {
        Self { config }
    }

    /// Estimated hourly cost: table price times instance count.
    pub fn estimate_hourly_cost(&self, artifact: &DeploymentArtifact) -> f64 {
        let base = self
            .config
            .instance_pricing
            .get(&artifact.instance_type)
            .copied()
            .unwrap_or(UNKNOWN_INSTANCE_PRICE);
        base * f64::from(artifact.instance_count)
    }

    fn policy(&self, env: Environment) -> Option<&EnvPolicy> {
        self.config.env_policies.get(&env)
    }

    /// Validate an artifact against the declarative rule set.
    pub fn validate(
        &self,
        artifact: &DeploymentArtifact,
        env: Environment,
        constraints: &Constraints,
    ) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // Schema rules
        if !is_valid_resource_name(&artifact.model_name) {
            errors.push(format!(
                "model_name '{}' must match [a-z0-9][a-z0-9-]{{0,62}}",
                artifact.model_name
            ));
        }
        if !is_valid_resource_name(&artifact.endpoint_name) {
            errors.push(format!(
                "endpoint_name '{}' must match [a-z0-9][a-z0-9-]{{0,62}}",
                artifact.endpoint_name
            ));
        }
        if !(1..=4).contains(&artifact.instance_count) {
            errors.push(format!(
                "instance_count must be between 1 and 4, got {}",
                artifact.instance_count
            ));
        }
        if !(1..=100).contains(&artifact.max_payload_mb) {
            errors.push(format!(
                "max_payload_mb must be between 1 and 100, got {}",
                artifact.max_payload_mb
            ));
        }
        if artifact.autoscaling_min > artifact.autoscaling_max {
            errors.push(format!(
                "autoscaling_min ({}) must be <= autoscaling_max ({})",
                artifact.autoscaling_min, artifact.autoscaling_max
            ));
        }
        if artifact.autoscaling_max > 8 {
            errors.push(format!(
                "autoscaling_max must be <= 8, got {}",
                artifact.autoscaling_max
            ));
        }
        if artifact.budget_usd_per_hour < 0.0 {
            errors.push(format!(
                "budget_usd_per_hour must be non-negative, got {}",
                artifact.budget_usd_per_hour
            ));
        }
        if !self
            .config
            .instance_pricing
            .contains_key(&artifact.instance_type)
        {
            warnings.push(format!(
                "unknown instance type {}, cost estimation may be inaccurate",
                artifact.instance_type
            ));
        }

        // Environment rules
        if let Some(policy) = self.policy(env) {
            if let Some(allowed) = &policy.allowed_instance_types {
                if !allowed.contains(&artifact.instance_type) {
                    errors.push(format!(
                        "environment {} requires instance types {:?}, got {}",
                        env, allowed, artifact.instance_type
                    ));
                }
            }
            if artifact.instance_count < policy.min_instance_count {
                if env == Environment::Prod {
                    errors.push(format!(
                        "prod deployments require instance_count >= {} for HA, got {}",
                        policy.min_instance_count, artifact.instance_count
                    ));
                } else {
                    errors.push(format!(
                        "environment {} requires minimum {} instances, got {}",
                        env, policy.min_instance_count, artifact.instance_count
                    ));
                }
            }
            if artifact.instance_count > policy.max_instance_count {
                errors.push(format!(
                    "environment {} allows maximum {} instances, got {}",
                    env, policy.max_instance_count, artifact.instance_count
                ));
            }

            // Budget rule: estimated cost must fit both the environment cap
            // and the user constraint.
            let estimated = self.estimate_hourly_cost(artifact);
            if estimated > policy.max_budget_usd_per_hour {
                errors.push(format!(
                    "estimated cost ${estimated:.2}/hour exceeds {} max budget ${:.2}/hour",
                    env, policy.max_budget_usd_per_hour
                ));
            }
            if let Some(user_budget) = constraints.budget_usd_per_hour {
                if estimated > user_budget {
                    errors.push(format!(
                        "estimated cost ${estimated:.2}/hour exceeds user constraint ${user_budget:.2}/hour"
                    ));
                } else if estimated > user_budget * BUDGET_WARN_RATIO {
                    warnings.push(format!(
                        "estimated cost ${estimated:.2}/hour is close to budget limit ${user_budget:.2}/hour"
                    ));
                }
            }
        }

        // Prod rollback alarms
        if env == Environment::Prod && artifact.rollback_alarms.is_empty() {
            errors.push("prod deployments require at least one rollback alarm".to_string());
        }

        ValidationReport {
            ok: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Whether a deployment needs human approval before execution.
    pub fn requires_approval(&self, artifact: &DeploymentArtifact, env: Environment) -> bool {
        if env == Environment::Prod {
            return true;
        }
        if self.estimate_hourly_cost(artifact) > self.config.approval_cost_threshold {
            return true;
        }
        env == Environment::Staging && artifact.instance_count >= 3
    }
}

impl Default for Guardrails {
    fn default() -> Self {
        Self::new(GuardrailConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> DeploymentArtifact {
        DeploymentArtifact {
            model_name: "llama-3-1-8b".to_string(),
            endpoint_name: "chatbot-x-staging".to_string(),
            instance_type: "ml.m5.large".to_string(),
            instance_count: 1,
            max_payload_mb: 6,
            autoscaling_min: 1,
            autoscaling_max: 2,
            rollback_alarms: vec![],
            budget_usd_per_hour: 15.0,
        }
    }

    fn guardrails() -> Guardrails {
        Guardrails::default()
    }

    #[test]
    fn test_staging_single_instance_passes() {
        let report = guardrails().validate(
            &artifact(),
            Environment::Staging,
            &Constraints::with_budget(15.0),
        );
        assert!(report.ok, "unexpected errors: {:?}", report.errors);
    }

    #[test]
    fn test_instance_count_boundaries() {
        let rails = guardrails();
        let mut a = artifact();

        a.instance_count = 0;
        let report = rails.validate(&a, Environment::Staging, &Constraints::default());
        assert!(!report.ok);
        assert!(report.errors.iter().any(|e| e.contains("instance_count")));

        a.instance_count = 1;
        assert!(rails
            .validate(&a, Environment::Staging, &Constraints::default())
            .ok);

        a.instance_count = 5;
        let report = rails.validate(&a, Environment::Staging, &Constraints::default());
        assert!(!report.ok);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("between 1 and 4")));
    }

    #[test]
    fn test_prod_requires_ha_and_alarms() {
        let rails = guardrails();
        let mut a = artifact();
        a.instance_count = 1;
        let report = rails.validate(&a, Environment::Prod, &Constraints::default());
        assert!(report.errors.iter().any(|e| e.contains("HA")));
        assert!(report.errors.iter().any(|e| e.contains("rollback alarm")));

        a.instance_count = 2;
        a.rollback_alarms = vec!["model-monitor-alarm".to_string()];
        let report = rails.validate(&a, Environment::Prod, &Constraints::default());
        assert!(report.ok, "unexpected errors: {:?}", report.errors);
    }

    #[test]
    fn test_dev_restricts_instance_type() {
        let rails = guardrails();
        let mut a = artifact();
        a.instance_type = "ml.m5.xlarge".to_string();
        let report = rails.validate(&a, Environment::Dev, &Constraints::default());
        assert!(!report.ok);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("requires instance types")));
    }

    #[test]
    fn test_budget_exactly_at_cap_passes() {
        let rails = guardrails();
        let a = artifact();
        // 0.115 * 1 = 0.115; cap at exactly the estimate.
        let report = rails.validate(
            &a,
            Environment::Staging,
            &Constraints::with_budget(0.115),
        );
        assert!(report.ok, "unexpected errors: {:?}", report.errors);

        let report = rails.validate(
            &a,
            Environment::Staging,
            &Constraints::with_budget(0.114),
        );
        assert!(!report.ok);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("user constraint")));
    }

    #[test]
    fn test_budget_proximity_warning() {
        let rails = guardrails();
        let a = artifact();
        // estimate 0.115, budget 0.13 -> above 80% of budget
        let report = rails.validate(
            &a,
            Environment::Staging,
            &Constraints::with_budget(0.13),
        );
        assert!(report.ok);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("close to budget limit")));
    }

    #[test]
    fn test_validation_is_pure() {
        let rails = guardrails();
        let a = artifact();
        let constraints = Constraints::with_budget(15.0);
        let first = rails.validate(&a, Environment::Staging, &constraints);
        let second = rails.validate(&a, Environment::Staging, &constraints);
        assert_eq!(first, second);
    }

    #[test]
    fn test_approval_rule() {
        let rails = guardrails();
        let mut a = artifact();
        assert!(rails.requires_approval(&a, Environment::Prod));
        assert!(!rails.requires_approval(&a, Environment::Staging));

        a.instance_count = 3;
        assert!(rails.requires_approval(&a, Environment::Staging));

        let mut pricey = artifact();
        pricey.instance_type = "ml.g5.12xlarge".to_string();
        pricey.instance_count = 2;
        assert!(rails.requires_approval(&pricey, Environment::Dev));
    }

    #[test]
    fn test_unknown_instance_type_warns() {
        let rails = guardrails();
        let mut a = artifact();
        a.instance_type = "ml.z9.mega".to_string();
        let report = rails.validate(&a, Environment::Prod, &Constraints::default());
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("unknown instance type")));
    }
}
