//! StepExecutor - dispatches a single step to the deployment backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use steward_core::agent::ExecutorAgent;
use steward_core::backend::{BackendError, BackendResponse, DeploymentBackend, EndpointStatus};
use steward_core::guardrails::Guardrails;
use steward_core::types::{DeploymentArtifact, DeploymentPlan, ErrorKind, StepOutcome, TaskStep};

/// Executor timeouts and the dry-run switch.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub backend_timeout: Duration,
    pub verify_timeout: Duration,
    pub verify_poll: Duration,
    /// When false, backend mutations are logged and synthesized as success.
    pub execute_real: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            backend_timeout: Duration::from_secs(60),
            verify_timeout: Duration::from_secs(15 * 60),
            verify_poll: Duration::from_secs(15),
            execute_real: false,
        }
    }
}

/// Executes deployment steps via the backend seam.
pub struct StepExecutor {
    backend: Arc<dyn DeploymentBackend>,
    guardrails: Guardrails,
    config: ExecutorConfig,
}

impl StepExecutor {
    pub fn new(
        backend: Arc<dyn DeploymentBackend>,
        guardrails: Guardrails,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            backend,
            guardrails,
            config,
        }
    }

    fn success_with_message(message: impl Into<String>) -> StepOutcome {
        let mut output = Map::new();
        output.insert("message".to_string(), Value::String(message.into()));
        StepOutcome::success(output)
    }

    fn artifact_for<'a>(&self, plan: &'a DeploymentPlan) -> Result<&'a DeploymentArtifact, StepOutcome> {
        plan.artifact.as_ref().ok_or_else(|| {
            StepOutcome::failure(ErrorKind::Semantic, "plan has no synthesized artifact")
        })
    }

    /// Wrap a backend mutation: dry-run short-circuit, timeout, and
    /// already-exists normalization.
    async fn mutate(
        &self,
        action: &str,
        dry_run_message: &str,
        call: impl std::future::Future<Output = Result<BackendResponse, BackendError>>,
    ) -> StepOutcome {
        if !self.config.execute_real {
            info!(action, "{dry_run_message}");
            let mut output = Map::new();
            output.insert(
                "message".to_string(),
                Value::String(format!("[dry-run] {dry_run_message}")),
            );
            output.insert("dry_run".to_string(), Value::Bool(true));
            return StepOutcome::success(output);
        }

        match tokio::time::timeout(self.config.backend_timeout, call).await {
            Ok(Ok(response)) => {
                let mut output = Map::new();
                if let Some(resource_id) = response.resource_id {
                    output.insert("resource_id".to_string(), Value::String(resource_id));
                }
                if let Some(detail) = response.detail {
                    output.insert("detail".to_string(), Value::String(detail));
                }
                StepOutcome::success(output)
            }
            // Repeated create against an idempotent backend counts as done.
            Ok(Err(BackendError::AlreadyExists(resource))) => {
                info!(action, resource, "resource already exists, treating as success");
                Self::success_with_message(format!("{resource} already exists"))
            }
            Ok(Err(e)) => StepOutcome::failure(e.kind(), e.to_string()),
            Err(_) => StepOutcome::failure(
                ErrorKind::Transient,
                format!("{action} timed out after {:?}", self.config.backend_timeout),
            ),
        }
    }

    fn validate_plan(&self, plan: &DeploymentPlan) -> StepOutcome {
        let artifact = match self.artifact_for(plan) {
            Ok(artifact) => artifact,
            Err(outcome) => return outcome,
        };
        let report = self
            .guardrails
            .validate(artifact, plan.env, &plan.constraints);
        if report.ok {
            let mut output = Map::new();
            output.insert("valid".to_string(), Value::Bool(true));
            output.insert("warnings".to_string(), json!(report.warnings));
            StepOutcome::success(output)
        } else {
            StepOutcome::failure(ErrorKind::Semantic, report.errors.join("; "))
        }
    }

    async fn verify_deployment(&self, plan: &DeploymentPlan) -> StepOutcome {
        let artifact = match self.artifact_for(plan) {
            Ok(artifact) => artifact,
            Err(outcome) => return outcome,
        };

        if !self.config.execute_real {
            info!(endpoint = %artifact.endpoint_name, "[dry-run] would verify endpoint health");
            let mut output = Map::new();
            output.insert(
                "message".to_string(),
                Value::String("[dry-run] would verify endpoint health".to_string()),
            );
            output.insert("dry_run".to_string(), Value::Bool(true));
            return StepOutcome::success(output);
        }

        let deadline = Instant::now() + self.config.verify_timeout;
        loop {
            let describe = tokio::time::timeout(
                self.config.backend_timeout,
                self.backend.describe_endpoint(&artifact.endpoint_name),
            )
            .await;

            match describe {
                Ok(Ok(description)) => match description.status {
                    EndpointStatus::InService => {
                        let mut output = Map::new();
                        output.insert(
                            "endpoint_status".to_string(),
                            Value::String("in_service".to_string()),
                        );
                        return StepOutcome::success(output);
                    }
                    EndpointStatus::Failed => {
                        return StepOutcome::failure(
                            ErrorKind::Semantic,
                            description
                                .detail
                                .unwrap_or_else(|| "endpoint entered failed state".to_string()),
                        );
                    }
                    status => {
                        info!(
                            endpoint = %artifact.endpoint_name,
                            status = ?status,
                            "endpoint not in service yet"
                        );
                    }
                },
                Ok(Err(e)) if e.kind() == ErrorKind::Transient => {
                    warn!(error = %e, "describe_endpoint failed transiently, polling on");
                }
                Ok(Err(e)) => return StepOutcome::failure(e.kind(), e.to_string()),
                Err(_) => {
                    warn!("describe_endpoint timed out, polling on");
                }
            }

            if Instant::now() + self.config.verify_poll > deadline {
                return StepOutcome::failure(
                    ErrorKind::Transient,
                    format!(
                        "endpoint did not reach in_service within {:?}",
                        self.config.verify_timeout
                    ),
                );
            }
            tokio::time::sleep(self.config.verify_poll).await;
        }
    }
}

#[async_trait]
impl ExecutorAgent for StepExecutor {
    async fn execute(&self, step: &TaskStep, plan: &DeploymentPlan) -> StepOutcome {
        let started = Instant::now();
        info!(
            plan_id = %plan.plan_id,
            step_id = %step.step_id,
            action = %step.action,
            "executing step"
        );

        let mut outcome = match step.action.as_str() {
            // Retrieval and config generation happen during submit; their
            // steps record that the work is already done.
            "retrieve_policies" => {
                let mut output = Map::new();
                output.insert(
                    "message".to_string(),
                    Value::String("policy retrieval completed during planning".to_string()),
                );
                output.insert("evidence_count".to_string(), json!(plan.evidence.len()));
                StepOutcome::success(output)
            }
            "generate_config" => match self.artifact_for(plan) {
                Ok(artifact) => {
                    let mut output = Map::new();
                    output.insert(
                        "message".to_string(),
                        Value::String("deployment configuration generated".to_string()),
                    );
                    output.insert(
                        "endpoint_name".to_string(),
                        Value::String(artifact.endpoint_name.clone()),
                    );
                    output.insert(
                        "instance_type".to_string(),
                        Value::String(artifact.instance_type.clone()),
                    );
                    StepOutcome::success(output)
                }
                Err(outcome) => outcome,
            },
            "validate_plan" => self.validate_plan(plan),
            "create_model" => match self.artifact_for(plan) {
                Ok(artifact) => {
                    self.mutate(
                        "create_model",
                        &format!("would create model {}", artifact.model_name),
                        self.backend.create_model(artifact),
                    )
                    .await
                }
                Err(outcome) => outcome,
            },
            "create_endpoint_config" => match self.artifact_for(plan) {
                Ok(artifact) => {
                    self.mutate(
                        "create_endpoint_config",
                        &format!("would create endpoint config for {}", artifact.endpoint_name),
                        self.backend.create_endpoint_config(artifact),
                    )
                    .await
                }
                Err(outcome) => outcome,
            },
            "create_endpoint" => match self.artifact_for(plan) {
                Ok(artifact) => {
                    self.mutate(
                        "create_endpoint",
                        &format!("would create endpoint {}", artifact.endpoint_name),
                        self.backend.create_endpoint(artifact),
                    )
                    .await
                }
                Err(outcome) => outcome,
            },
            "configure_monitoring" => match self.artifact_for(plan) {
                Ok(artifact) => {
                    self.mutate(
                        "configure_monitoring",
                        &format!(
                            "would configure monitor with {} rollback alarms",
                            artifact.rollback_alarms.len()
                        ),
                        self.backend.configure_monitor(artifact),
                    )
                    .await
                }
                Err(outcome) => outcome,
            },
            "verify_deployment" => self.verify_deployment(plan).await,
            unknown => {
                warn!(action = unknown, "unknown action, skipping");
                let mut output = Map::new();
                output.insert(
                    "message".to_string(),
                    Value::String(format!("action {unknown} not implemented, skipped")),
                );
                output.insert("skipped".to_string(), Value::Bool(true));
                StepOutcome::success(output)
            }
        };

        outcome.output.insert(
            "duration_ms".to_string(),
            json!(started.elapsed().as_millis() as u64),
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::backend::EndpointDescription;
    use steward_core::types::{AgentKind, Constraints, Environment, OutcomeStatus};

    struct HealthyBackend;

    #[async_trait]
    impl DeploymentBackend for HealthyBackend {
        async fn create_model(
            &self,
            artifact: &DeploymentArtifact,
        ) -> Result<BackendResponse, BackendError> {
            Ok(BackendResponse::with_resource_id(artifact.model_name.clone()))
        }

        async fn create_endpoint_config(
            &self,
            artifact: &DeploymentArtifact,
        ) -> Result<BackendResponse, BackendError> {
            Ok(BackendResponse::with_resource_id(format!(
                "{}-config",
                artifact.endpoint_name
            )))
        }

        async fn create_endpoint(
            &self,
            _artifact: &DeploymentArtifact,
        ) -> Result<BackendResponse, BackendError> {
            Err(BackendError::AlreadyExists("chatbot-x-staging".to_string()))
        }

        async fn describe_endpoint(
            &self,
            endpoint_name: &str,
        ) -> Result<EndpointDescription, BackendError> {
            Ok(EndpointDescription {
                endpoint_name: endpoint_name.to_string(),
                status: EndpointStatus::InService,
                detail: None,
            })
        }

        async fn delete_endpoint(
            &self,
            _endpoint_name: &str,
        ) -> Result<BackendResponse, BackendError> {
            Ok(BackendResponse::default())
        }

        async fn configure_monitor(
            &self,
            _artifact: &DeploymentArtifact,
        ) -> Result<BackendResponse, BackendError> {
            Ok(BackendResponse::default())
        }
    }

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

    fn plan_with_artifact() -> DeploymentPlan {
        let mut plan = DeploymentPlan::new(
            "alice",
            "deploy llama",
            Environment::Staging,
            Constraints::with_budget(15.0),
        );
        plan.artifact = Some(artifact());
        plan
    }

    fn executor(execute_real: bool) -> StepExecutor {
        StepExecutor::new(
            Arc::new(HealthyBackend),
            Guardrails::default(),
            ExecutorConfig {
                execute_real,
                verify_poll: Duration::from_millis(1),
                ..ExecutorConfig::default()
            },
        )
    }

    fn step(action: &str) -> TaskStep {
        TaskStep::new(format!("s-{action}"), AgentKind::Executor, action)
    }

    #[tokio::test]
    async fn test_dry_run_synthesizes_success() {
        let outcome = executor(false)
            .execute(&step("create_model"), &plan_with_artifact())
            .await;
        assert!(outcome.is_success());
        assert_eq!(outcome.output["dry_run"], Value::Bool(true));
        assert!(outcome.output["message"]
            .as_str()
            .unwrap()
            .starts_with("[dry-run]"));
    }

    #[tokio::test]
    async fn test_already_exists_counts_as_success() {
        let outcome = executor(true)
            .execute(&step("create_endpoint"), &plan_with_artifact())
            .await;
        assert!(outcome.is_success());
        assert!(outcome.output["message"]
            .as_str()
            .unwrap()
            .contains("already exists"));
    }

    #[tokio::test]
    async fn test_validate_plan_fails_on_guardrail_violation() {
        let mut plan = plan_with_artifact();
        plan.artifact.as_mut().unwrap().instance_count = 5;
        let outcome = executor(false).execute(&step("validate_plan"), &plan).await;
        assert_eq!(outcome.status, OutcomeStatus::Failure);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Semantic));
        assert!(outcome.needs_replan);
    }

    #[tokio::test]
    async fn test_verify_deployment_succeeds_when_in_service() {
        let outcome = executor(true)
            .execute(&step("verify_deployment"), &plan_with_artifact())
            .await;
        assert!(outcome.is_success());
        assert_eq!(outcome.output["endpoint_status"], json!("in_service"));
    }

    #[tokio::test]
    async fn test_missing_artifact_is_semantic_failure() {
        let plan = DeploymentPlan::new(
            "alice",
            "deploy llama",
            Environment::Staging,
            Constraints::default(),
        );
        let outcome = executor(false).execute(&step("create_model"), &plan).await;
        assert_eq!(outcome.error_kind, Some(ErrorKind::Semantic));
    }

    #[tokio::test]
    async fn test_unknown_action_is_skipped_success() {
        let outcome = executor(false)
            .execute(&step("reticulate_splines"), &plan_with_artifact())
            .await;
        assert!(outcome.is_success());
        assert_eq!(outcome.output["skipped"], Value::Bool(true));
    }

    #[tokio::test]
    async fn test_steps_record_duration_metric() {
        let outcome = executor(false)
            .execute(&step("retrieve_policies"), &plan_with_artifact())
            .await;
        assert!(outcome.output.contains_key("duration_ms"));
    }
}
