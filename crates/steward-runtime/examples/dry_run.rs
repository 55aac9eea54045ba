//! Dry-run walkthrough: submit a staging intent against in-memory stores and
//! a canned synthesizer, then print the plan and its audit trail.
//!
//! ```sh
//! cargo run -p steward-runtime --example dry_run
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use steward_agents::{AgentKernel, ExecutorConfig, OutcomeMonitor, ReactPlanner, StepExecutor};
use steward_core::backend::{
    BackendError, BackendResponse, DeploymentBackend, EndpointDescription, EndpointStatus,
};
use steward_core::config::OrchestratorConfig;
use steward_core::guardrails::Guardrails;
use steward_core::synthesizer::{SynthError, Synthesizer};
use steward_core::types::{Constraints, DeploymentArtifact, Environment, PlanStatus};
use steward_retrieval::{DocumentIndex, IndexedDocument, TwoStageRetriever};
use steward_runtime::{Components, Orchestrator, SubmitRequest};
use steward_stores::{InMemoryAuditSink, InMemoryMemoryStore, InMemoryPlanStore};

/// Stands in for the LLM: always proposes the same staging configuration.
struct CannedSynthesizer;

#[async_trait]
impl Synthesizer for CannedSynthesizer {
    async fn synthesize(&self, _prompt: &str) -> Result<DeploymentArtifact, SynthError> {
        Ok(DeploymentArtifact {
            model_name: "llama-3-1-8b-chatbot-x".to_string(),
            endpoint_name: "chatbot-x-staging".to_string(),
            instance_type: "ml.m5.large".to_string(),
            instance_count: 1,
            max_payload_mb: 6,
            autoscaling_min: 1,
            autoscaling_max: 2,
            rollback_alarms: vec![],
            budget_usd_per_hour: 15.0,
        })
    }
}

/// A backend that would be real in production; dry-run mode never calls the
/// mutating methods anyway.
struct NullBackend;

#[async_trait]
impl DeploymentBackend for NullBackend {
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
        Ok(BackendResponse::with_resource_id(artifact.endpoint_name.clone()))
    }

    async fn create_endpoint(
        &self,
        artifact: &DeploymentArtifact,
    ) -> Result<BackendResponse, BackendError> {
        Ok(BackendResponse::with_resource_id(artifact.endpoint_name.clone()))
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

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = OrchestratorConfig::default();

    let index = DocumentIndex::new();
    index.add(IndexedDocument::new(
        "policy-staging-instances",
        "Staging instance policy",
        "staging deployments may use ml.m5.large or ml.m5.xlarge instances",
    ));
    index.add(IndexedDocument::new(
        "policy-budgets",
        "Budget policy",
        "staging deployments must stay under fifteen dollars per hour",
    ));
    index.add(IndexedDocument::new(
        "policy-prod",
        "Prod policy",
        "prod deployments require approval, two instances and rollback alarms",
    ));
    let retriever = Arc::new(TwoStageRetriever::new(
        Arc::new(index),
        config.retrieve_timeout,
    ));

    let backend = Arc::new(NullBackend);
    let memory = Arc::new(InMemoryMemoryStore::new(config.memory_ttl_days));
    let audit = Arc::new(InMemoryAuditSink::new());
    let kernel = Arc::new(AgentKernel::new(
        memory.clone(),
        config.memory_recall_limit,
        config.memory_retry_threshold,
    ));

    let orchestrator = Orchestrator::new(
        config.clone(),
        Components {
            planner: Arc::new(ReactPlanner::new(Arc::new(CannedSynthesizer), kernel)),
            executor: Arc::new(StepExecutor::new(
                backend.clone(),
                Guardrails::new(config.guardrails.clone()),
                ExecutorConfig::default(),
            )),
            monitor: Arc::new(OutcomeMonitor::new(
                config.max_retries_per_step,
                config.memory_replan_threshold,
            )),
            retriever,
            backend,
            plan_store: Arc::new(InMemoryPlanStore::new()),
            memory_store: memory,
            audit: audit.clone(),
        },
    );

    let response = orchestrator
        .submit(SubmitRequest {
            user_id: "demo@example.com".to_string(),
            intent: "deploy llama-3.1 8B for chatbot-x".to_string(),
            env: Environment::Staging,
            constraints: Some(Constraints::with_budget(15.0)),
        })
        .await
        .expect("submit failed");
    println!("submitted plan {} ({})", response.plan_id, response.status);

    loop {
        let plan = orchestrator
            .get_plan(&response.plan_id)
            .await
            .expect("plan should exist");
        if matches!(
            plan.status,
            PlanStatus::Deployed | PlanStatus::Failed | PlanStatus::ValidationFailed
        ) {
            println!("final status: {}", plan.status);
            if let Some(execution_plan) = &plan.execution_plan {
                for step in &execution_plan.steps {
                    println!(
                        "  {:<28} {:<12} {}",
                        step.action,
                        format!("{:?}", step.status).to_lowercase(),
                        step.output.get("message").and_then(|v| v.as_str()).unwrap_or("")
                    );
                }
            }
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    println!("\naudit trail:");
    for record in audit.records_for_plan(&response.plan_id) {
        println!("  {} {}", record.timestamp.format("%H:%M:%S%.3f"), record.event_type);
    }

    orchestrator.shutdown().await;
}
