//! Deployment artifact definitions
//!
//! The artifact is the structured configuration synthesized from a
//! natural-language intent and validated by the guardrails.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Target deployment environment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The synthesized deployment configuration.
///
/// Field ranges are enforced by [`crate::guardrails::Guardrails::validate`];
/// the struct itself stays permissive so that invalid synthesizer output can
/// be carried to the validation step instead of failing at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentArtifact {
    /// Model resource name
    pub model_name: String,
    /// Endpoint resource name
    pub endpoint_name: String,
    /// Hosting instance type (e.g. `ml.m5.large`)
    pub instance_type: String,
    /// Number of instances behind the endpoint
    #[serde(default = "default_instance_count")]
    pub instance_count: u32,
    /// Max request payload size in MB
    #[serde(default = "default_max_payload_mb")]
    pub max_payload_mb: u32,
    /// Autoscaling floor
    #[serde(default = "default_autoscaling_min")]
    pub autoscaling_min: u32,
    /// Autoscaling ceiling
    #[serde(default = "default_autoscaling_max")]
    pub autoscaling_max: u32,
    /// Alarm names that trigger rollback
    #[serde(default)]
    pub rollback_alarms: Vec<String>,
    /// Budget constraint in USD per hour
    #[serde(default = "default_budget")]
    pub budget_usd_per_hour: f64,
}

fn default_instance_count() -> u32 {
    1
}

fn default_max_payload_mb() -> u32 {
    6
}

fn default_autoscaling_min() -> u32 {
    1
}

fn default_autoscaling_max() -> u32 {
    2
}

fn default_budget() -> f64 {
    10.0
}

/// Check a resource name against `[a-z0-9][a-z0-9-]{0,62}`.
pub fn is_valid_resource_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return false;
    }
    if name.len() > 63 {
        return false;
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// User-provided constraints attached to an intent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Hourly budget cap in USD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_usd_per_hour: Option<f64>,
    /// Additional free-form constraints
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl Constraints {
    /// Constraints with only a budget cap.
    pub fn with_budget(budget_usd_per_hour: f64) -> Self {
        Self {
            budget_usd_per_hour: Some(budget_usd_per_hour),
            extra: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_name_validation() {
        assert!(is_valid_resource_name("llama-3-1-8b"));
        assert!(is_valid_resource_name("a"));
        assert!(is_valid_resource_name("0abc"));
        assert!(!is_valid_resource_name(""));
        assert!(!is_valid_resource_name("-leading-dash"));
        assert!(!is_valid_resource_name("Uppercase"));
        assert!(!is_valid_resource_name("under_score"));
        assert!(!is_valid_resource_name(&"x".repeat(64)));
        assert!(is_valid_resource_name(&"x".repeat(63)));
    }

    #[test]
    fn test_artifact_deserializes_with_defaults() {
        let artifact: DeploymentArtifact = serde_json::from_str(
            r#"{"model_name":"m","endpoint_name":"e","instance_type":"ml.m5.large"}"#,
        )
        .unwrap();
        assert_eq!(artifact.instance_count, 1);
        assert_eq!(artifact.max_payload_mb, 6);
        assert_eq!(artifact.autoscaling_min, 1);
        assert_eq!(artifact.autoscaling_max, 2);
        assert!(artifact.rollback_alarms.is_empty());
    }

    #[test]
    fn test_environment_serde_snake_case() {
        assert_eq!(serde_json::to_string(&Environment::Prod).unwrap(), "\"prod\"");
        let env: Environment = serde_json::from_str("\"staging\"").unwrap();
        assert_eq!(env, Environment::Staging);
    }
}
