//! # Steward Core
//!
//! Core abstractions and deterministic logic for the Steward deployment
//! orchestrator.
//!
//! This crate contains:
//! - Artifact / Plan / Step / Evidence / Reasoning / Memory definitions
//! - The deployment plan state machine
//! - Guardrail validation (pure, declarative rules)
//! - Trait seams for agents, retrieval, synthesis, the deployment backend
//!   and the durable stores
//!
//! This crate does NOT care about:
//! - How plans are scheduled or locked (steward-runtime)
//! - Which LLM or retrieval service is behind the seams (steward-agents,
//!   steward-retrieval)
//! - How stores persist their data (steward-stores)

pub mod agent;
pub mod backend;
pub mod config;
pub mod guardrails;
pub mod retriever;
pub mod similarity;
pub mod store;
pub mod synthesizer;
pub mod types;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::agent::{
        ExecutorAgent, MonitorAgent, MonitorDecision, PlanError, PlanRequest, PlannerAgent,
        PlannerOutput, ReplanRequest,
    };
    pub use crate::backend::{
        BackendError, BackendResponse, DeploymentBackend, EndpointDescription, EndpointStatus,
    };
    pub use crate::config::{EnvPolicy, GuardrailConfig, OrchestratorConfig};
    pub use crate::guardrails::{Guardrails, ValidationReport};
    pub use crate::retriever::{EmbeddingClient, RerankClient, RetrievalError, Retriever};
    pub use crate::store::{
        AuditSink, MemoryStore, PlanFilter, PlanStore, StoreError,
    };
    pub use crate::synthesizer::{SynthError, Synthesizer};
    pub use crate::types::{
        AgentKind, Approval, ApprovalDecision, AuditEventType, AuditRecord, Constraints,
        CorrelationId, DeploymentArtifact, DeploymentPlan, Environment, ErrorKind, Evidence,
        ExecutionPlan, MemoryContext, MemoryEntry, MemoryKind, MemoryOutcome, OutcomeStatus,
        PlanId, PlanStatus, ReasoningChain, ReasoningStep, Resolution, StepOutcome, StepStatus,
        TaskStep,
    };
}

pub use agent::{ExecutorAgent, MonitorAgent, MonitorDecision, PlannerAgent, PlannerOutput};
pub use backend::{BackendError, BackendResponse, DeploymentBackend, EndpointStatus};
pub use config::OrchestratorConfig;
pub use guardrails::{Guardrails, ValidationReport};
pub use retriever::Retriever;
pub use store::{AuditSink, MemoryStore, PlanStore, StoreError};
pub use synthesizer::Synthesizer;
pub use types::{
    DeploymentArtifact, DeploymentPlan, Environment, ErrorKind, Evidence, ExecutionPlan, PlanId,
    PlanStatus, StepOutcome, StepStatus, TaskStep,
};
