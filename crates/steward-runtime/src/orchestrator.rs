//! Orchestrator - plan lifecycle entry points
//!
//! Submit / approve / pause / restart / delete / get / list. Every entry
//! point acquires the plan's single-flight lock; the step loop itself lives
//! in the execution module.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::json;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use steward_agents::AgentKernel;
use steward_core::agent::{
    ExecutorAgent, MonitorAgent, PlanError, PlanRequest, PlannerAgent,
};
use steward_core::backend::DeploymentBackend;
use steward_core::config::OrchestratorConfig;
use steward_core::guardrails::Guardrails;
use steward_core::retriever::Retriever;
use steward_core::store::{AuditSink, MemoryStore, PlanFilter, PlanStore, StoreError};
use steward_core::types::{
    Approval, ApprovalDecision, AuditEventType, AuditRecord, Constraints, CorrelationId,
    DeploymentPlan, Environment, Evidence, PendingApproval, PlanId, PlanStatus, PlanSummary,
    StepStatus,
};

/// System actor recorded on orchestrator-driven transitions.
pub(crate) const SYSTEM_ACTOR: &str = "orchestrator";

/// Orchestrator errors surfaced to callers.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("plan not found: {0}")]
    PlanNotFound(String),
    #[error("state conflict for plan {plan_id}: {message}")]
    StateConflict { plan_id: String, message: String },
    #[error("replan budget exhausted for plan {0}")]
    ReplanBudgetExhausted(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("planner error: {0}")]
    Planner(#[from] PlanError),
    #[error("orchestrator is shutting down")]
    ShuttingDown,
    #[error("internal error: {0}")]
    Internal(String),
}

/// Pluggable collaborators handed to the orchestrator at construction.
#[derive(Clone)]
pub struct Components {
    pub planner: Arc<dyn PlannerAgent>,
    pub executor: Arc<dyn ExecutorAgent>,
    pub monitor: Arc<dyn MonitorAgent>,
    pub retriever: Arc<dyn Retriever>,
    pub backend: Arc<dyn DeploymentBackend>,
    pub plan_store: Arc<dyn PlanStore>,
    pub memory_store: Arc<dyn MemoryStore>,
    pub audit: Arc<dyn AuditSink>,
}

/// Intent submission input.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub user_id: String,
    pub intent: String,
    pub env: Environment,
    pub constraints: Option<Constraints>,
}

/// Intent submission result.
#[derive(Debug, Clone)]
pub struct SubmitResponse {
    pub plan_id: PlanId,
    pub status: PlanStatus,
}

/// Approval decision input.
#[derive(Debug, Clone)]
pub struct ApproveRequest {
    pub plan_id: PlanId,
    pub approver: String,
    pub decision: ApprovalDecision,
    pub reason: Option<String>,
}

/// Delete result, including partial-failure details for hard deletes.
#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    pub plan_id: PlanId,
    pub hard: bool,
    pub details: Vec<String>,
}

/// Cancellation intent observed by the step loop at step boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelKind {
    Pause,
    Delete { hard: bool },
}

/// The deployment orchestrator.
pub struct Orchestrator {
    pub(crate) config: OrchestratorConfig,
    pub(crate) guardrails: Guardrails,
    pub(crate) planner: Arc<dyn PlannerAgent>,
    pub(crate) executor: Arc<dyn ExecutorAgent>,
    pub(crate) monitor: Arc<dyn MonitorAgent>,
    pub(crate) retriever: Arc<dyn Retriever>,
    pub(crate) backend: Arc<dyn DeploymentBackend>,
    pub(crate) plan_store: Arc<dyn PlanStore>,
    pub(crate) memory_store: Arc<dyn MemoryStore>,
    pub(crate) audit_sink: Arc<dyn AuditSink>,
    pub(crate) kernel: Arc<AgentKernel>,
    /// Single-flight locks keyed by plan id
    locks: StdMutex<HashMap<PlanId, Arc<Mutex<()>>>>,
    /// Cancellation intents waiting to be observed at a step boundary
    cancel_requests: StdMutex<HashMap<PlanId, CancelKind>>,
    /// Tokens of currently running step loops
    pub(crate) active_loops: StdMutex<HashMap<PlanId, CancellationToken>>,
    /// Worker pool gating execution tasks
    pool: Arc<Semaphore>,
    pub(crate) shutdown_token: CancellationToken,
    inflight: StdMutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, components: Components) -> Arc<Self> {
        let guardrails = Guardrails::new(config.guardrails.clone());
        let kernel = Arc::new(AgentKernel::new(
            components.memory_store.clone(),
            config.memory_recall_limit,
            config.memory_retry_threshold,
        ));
        let pool = Arc::new(Semaphore::new(config.worker_pool_size.max(1)));
        Arc::new(Self {
            guardrails,
            planner: components.planner,
            executor: components.executor,
            monitor: components.monitor,
            retriever: components.retriever,
            backend: components.backend,
            plan_store: components.plan_store,
            memory_store: components.memory_store,
            audit_sink: components.audit,
            kernel,
            locks: StdMutex::new(HashMap::new()),
            cancel_requests: StdMutex::new(HashMap::new()),
            active_loops: StdMutex::new(HashMap::new()),
            pool,
            shutdown_token: CancellationToken::new(),
            inflight: StdMutex::new(Vec::new()),
            config,
        })
    }

    /// Submit an intent: persist, retrieve, plan, validate, then either park
    /// for approval or enqueue execution.
    pub async fn submit(
        self: &Arc<Self>,
        request: SubmitRequest,
    ) -> Result<SubmitResponse, OrchestratorError> {
        if self.shutdown_token.is_cancelled() {
            return Err(OrchestratorError::ShuttingDown);
        }

        let correlation_id = CorrelationId::generate();
        let mut plan = DeploymentPlan::new(
            request.user_id.clone(),
            request.intent.clone(),
            request.env,
            request.constraints.unwrap_or_default(),
        );
        let plan_id = plan.plan_id.clone();
        let lock = self.plan_lock(&plan_id);
        let _guard = lock.lock().await;

        info!(
            plan_id = %plan_id,
            correlation_id = %correlation_id,
            user_id = %request.user_id,
            env = %request.env,
            "intent submitted"
        );

        self.plan_store.put(&plan).await?;
        self.audit(
            AuditRecord::new(&plan_id, AuditEventType::IntentSubmitted, &request.user_id)
                .with_transition(PlanStatus::Created, PlanStatus::Validating)
                .with_metadata(json!({
                    "intent": request.intent.clone(),
                    "env": request.env.as_str(),
                })),
        )
        .await;

        self.transition(&mut plan, PlanStatus::Validating)?;
        self.plan_store.put(&plan).await?;

        // Ground the intent in the policy corpus; a timed-out retriever only
        // costs a warning.
        let (evidence, retrieval_warning) = self
            .retrieve_evidence(&request.intent, self.config.top_k_initial)
            .await;
        plan.evidence = evidence;
        if let Some(warning) = retrieval_warning {
            warn!(plan_id = %plan_id, warning = %warning, "proceeding with empty evidence");
            plan.warnings.push(warning);
        }

        let plan_request = PlanRequest {
            plan_id: plan_id.clone(),
            intent: request.intent.clone(),
            env: request.env,
            evidence: plan.evidence.clone(),
            constraints: plan.constraints.clone(),
            correlation_id: correlation_id.clone(),
        };
        match self.planner.plan(&plan_request).await {
            Ok(output) => {
                plan.artifact = Some(output.artifact);
                plan.execution_plan = Some(output.execution_plan);
            }
            Err(e) => {
                warn!(plan_id = %plan_id, error = %e, "planning failed");
                plan.validation_errors = vec![e.to_string()];
                return self.finish_validation_failure(plan).await;
            }
        }

        let (report, needs_approval) = {
            let artifact = plan.artifact.as_ref().ok_or_else(|| {
                OrchestratorError::Internal("planner returned no artifact".to_string())
            })?;
            (
                self.guardrails.validate(artifact, plan.env, &plan.constraints),
                self.guardrails.requires_approval(artifact, plan.env),
            )
        };
        plan.warnings.extend(report.warnings.clone());
        if !report.ok {
            plan.validation_errors = report.errors;
            return self.finish_validation_failure(plan).await;
        }

        self.audit(
            AuditRecord::new(&plan_id, AuditEventType::ValidationPassed, SYSTEM_ACTOR)
                .with_metadata(json!({ "warnings": report.warnings })),
        )
        .await;

        if needs_approval {
            self.transition(&mut plan, PlanStatus::AwaitingApproval)?;
            self.plan_store.put(&plan).await?;
            self.audit(
                AuditRecord::new(&plan_id, AuditEventType::ApprovalRequested, SYSTEM_ACTOR)
                    .with_transition(PlanStatus::Validating, PlanStatus::AwaitingApproval),
            )
            .await;
            info!(plan_id = %plan_id, "plan parked awaiting approval");
            return Ok(SubmitResponse {
                plan_id,
                status: PlanStatus::AwaitingApproval,
            });
        }

        self.transition(&mut plan, PlanStatus::Deploying)?;
        self.plan_store.put(&plan).await?;
        self.spawn_execute(plan_id.clone());
        Ok(SubmitResponse {
            plan_id,
            status: PlanStatus::Deploying,
        })
    }

    async fn finish_validation_failure(
        &self,
        mut plan: DeploymentPlan,
    ) -> Result<SubmitResponse, OrchestratorError> {
        let plan_id = plan.plan_id.clone();
        let errors = plan.validation_errors.clone();
        self.transition(&mut plan, PlanStatus::ValidationFailed)?;
        self.plan_store.put(&plan).await?;
        self.audit(
            AuditRecord::new(&plan_id, AuditEventType::ValidationFailed, SYSTEM_ACTOR)
                .with_transition(PlanStatus::Validating, PlanStatus::ValidationFailed)
                .with_metadata(json!({ "errors": errors })),
        )
        .await;
        Ok(SubmitResponse {
            plan_id,
            status: PlanStatus::ValidationFailed,
        })
    }

    /// Record an approval decision. Legal only in `awaiting_approval`.
    pub async fn approve(
        self: &Arc<Self>,
        request: ApproveRequest,
    ) -> Result<SubmitResponse, OrchestratorError> {
        let lock = self.plan_lock(&request.plan_id);
        let _guard = lock.lock().await;

        let mut plan = self.load_plan(&request.plan_id).await?;
        if plan.status != PlanStatus::AwaitingApproval {
            return Err(OrchestratorError::StateConflict {
                plan_id: request.plan_id.clone(),
                message: format!(
                    "approval is only legal in awaiting_approval, plan is {}",
                    plan.status
                ),
            });
        }

        plan.approval = Some(Approval {
            approver: request.approver.clone(),
            decision: request.decision,
            timestamp: chrono::Utc::now(),
            reason: request.reason.clone(),
        });

        match request.decision {
            ApprovalDecision::Approved => {
                self.transition(&mut plan, PlanStatus::Approved)?;
                self.transition(&mut plan, PlanStatus::Deploying)?;
                self.plan_store.put(&plan).await?;
                self.audit(
                    AuditRecord::new(&request.plan_id, AuditEventType::Approved, &request.approver)
                        .with_transition(PlanStatus::AwaitingApproval, PlanStatus::Deploying)
                        .with_metadata(json!({ "reason": request.reason })),
                )
                .await;
                info!(plan_id = %request.plan_id, approver = %request.approver, "plan approved");
                self.spawn_execute(request.plan_id.clone());
                Ok(SubmitResponse {
                    plan_id: request.plan_id,
                    status: PlanStatus::Deploying,
                })
            }
            ApprovalDecision::Rejected => {
                self.transition(&mut plan, PlanStatus::Rejected)?;
                self.plan_store.put(&plan).await?;
                self.audit(
                    AuditRecord::new(&request.plan_id, AuditEventType::Rejected, &request.approver)
                        .with_transition(PlanStatus::AwaitingApproval, PlanStatus::Rejected)
                        .with_metadata(json!({ "reason": request.reason })),
                )
                .await;
                info!(plan_id = %request.plan_id, approver = %request.approver, "plan rejected");
                Ok(SubmitResponse {
                    plan_id: request.plan_id,
                    status: PlanStatus::Rejected,
                })
            }
        }
    }

    /// Pause a plan. A running step finishes first; the loop observes the
    /// request at the next step boundary.
    pub async fn pause(&self, plan_id: &str) -> Result<(), OrchestratorError> {
        if self.request_cancel(plan_id, CancelKind::Pause) {
            info!(plan_id, "pause requested, will take effect at the next step boundary");
            return Ok(());
        }

        let lock = self.plan_lock(plan_id);
        let _guard = lock.lock().await;
        let mut plan = self.load_plan(plan_id).await?;
        if !plan.status.is_pausable() {
            return Err(OrchestratorError::StateConflict {
                plan_id: plan_id.to_string(),
                message: format!("cannot pause a plan in {}", plan.status),
            });
        }
        let before = plan.status;
        self.transition(&mut plan, PlanStatus::Paused)?;
        self.plan_store.put(&plan).await?;
        self.audit(
            AuditRecord::new(plan_id, AuditEventType::Paused, SYSTEM_ACTOR)
                .with_transition(before, PlanStatus::Paused),
        )
        .await;
        Ok(())
    }

    /// Restart a paused, failed or deployed plan from the first
    /// non-completed step.
    pub async fn restart(self: &Arc<Self>, plan_id: &str) -> Result<(), OrchestratorError> {
        let lock = self.plan_lock(plan_id);
        let _guard = lock.lock().await;

        let mut plan = self.load_plan(plan_id).await?;
        if !plan.status.is_restartable() {
            return Err(OrchestratorError::StateConflict {
                plan_id: plan_id.to_string(),
                message: format!("cannot restart a plan in {}", plan.status),
            });
        }

        // Give non-completed steps a clean slate; completed work stands.
        if let Some(execution_plan) = plan.execution_plan.as_mut() {
            for step in &mut execution_plan.steps {
                if !matches!(step.status, StepStatus::Completed | StepStatus::Skipped) {
                    step.set_status(StepStatus::Pending);
                    step.retry_count = 0;
                    step.error = None;
                }
            }
        }

        let before = plan.status;
        self.transition(&mut plan, PlanStatus::Deploying)?;
        self.plan_store.put(&plan).await?;
        self.audit(
            AuditRecord::new(plan_id, AuditEventType::Restarted, SYSTEM_ACTOR)
                .with_transition(before, PlanStatus::Deploying),
        )
        .await;
        info!(plan_id, "plan restarted");
        self.spawn_execute(plan_id.to_string());
        Ok(())
    }

    /// Delete a plan. Soft delete keeps the row and filters it from default
    /// listings; hard delete additionally tears down the endpoint
    /// (best-effort), removes plan-scoped memories and drops the row.
    pub async fn delete_plan(
        &self,
        plan_id: &str,
        hard: bool,
    ) -> Result<DeleteOutcome, OrchestratorError> {
        if self.request_cancel(plan_id, CancelKind::Delete { hard }) {
            info!(plan_id, hard, "delete requested, running step will finish first");
            return Ok(DeleteOutcome {
                plan_id: plan_id.to_string(),
                hard,
                details: vec!["delete takes effect at the next step boundary".to_string()],
            });
        }

        let lock = self.plan_lock(plan_id);
        let _guard = lock.lock().await;
        let plan = self.load_plan(plan_id).await?;
        if plan.status == PlanStatus::Deleted {
            return Err(OrchestratorError::StateConflict {
                plan_id: plan_id.to_string(),
                message: "plan is already deleted".to_string(),
            });
        }
        self.finish_delete(plan, hard, SYSTEM_ACTOR).await
    }

    /// Fetch a plan, including soft-deleted ones.
    pub async fn get_plan(&self, plan_id: &str) -> Result<DeploymentPlan, OrchestratorError> {
        self.load_plan(plan_id).await
    }

    /// List plan summaries; soft-deleted plans are excluded unless the
    /// filter asks for them.
    pub async fn list_plans(
        &self,
        filter: &PlanFilter,
    ) -> Result<Vec<PlanSummary>, OrchestratorError> {
        let plans = self.plan_store.list(filter).await?;
        Ok(plans.iter().map(|p| self.summarize(p)).collect())
    }

    /// Plans currently waiting for an approval decision.
    pub async fn list_pending_approvals(
        &self,
    ) -> Result<Vec<PendingApproval>, OrchestratorError> {
        let plans = self
            .plan_store
            .list(&PlanFilter::by_status(PlanStatus::AwaitingApproval))
            .await?;
        Ok(plans
            .into_iter()
            .map(|p| {
                let estimated = p
                    .artifact
                    .as_ref()
                    .map(|a| self.guardrails.estimate_hourly_cost(a));
                PendingApproval {
                    plan_id: p.plan_id,
                    user_id: p.user_id,
                    intent: p.intent,
                    env: p.env,
                    estimated_cost_usd_per_hour: estimated,
                    requested_at: p.updated_at,
                }
            })
            .collect())
    }

    /// Stop accepting submissions, drain running loops to their next step
    /// boundary and wait for execution tasks to finish.
    pub async fn shutdown(&self) {
        info!("orchestrator shutting down");
        self.shutdown_token.cancel();
        let tokens: Vec<CancellationToken> = {
            let active = self
                .active_loops
                .lock()
                .expect("active loop map lock poisoned");
            active.values().cloned().collect()
        };
        for token in tokens {
            token.cancel();
        }

        let handles: Vec<JoinHandle<()>> = {
            let mut inflight = self.inflight.lock().expect("inflight lock poisoned");
            inflight.drain(..).collect()
        };
        for result in futures_util::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "execution task join failed during shutdown");
            }
        }
    }

    // --- internals shared with the execution module ---

    pub(crate) fn plan_lock(&self, plan_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("plan lock map poisoned");
        locks
            .entry(plan_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(crate) async fn load_plan(
        &self,
        plan_id: &str,
    ) -> Result<DeploymentPlan, OrchestratorError> {
        self.plan_store
            .get(plan_id)
            .await?
            .ok_or_else(|| OrchestratorError::PlanNotFound(plan_id.to_string()))
    }

    /// Validate and apply a status transition in memory. Persisting is the
    /// caller's job; a failed store write leaves the durable state at the
    /// previous committed status.
    pub(crate) fn transition(
        &self,
        plan: &mut DeploymentPlan,
        next: PlanStatus,
    ) -> Result<PlanStatus, OrchestratorError> {
        let before = plan.status;
        if !before.can_transition_to(next) {
            return Err(OrchestratorError::StateConflict {
                plan_id: plan.plan_id.clone(),
                message: format!("illegal transition {before} -> {next}"),
            });
        }
        debug!(plan_id = %plan.plan_id, from = %before, to = %next, "plan transition");
        plan.set_status(next);
        Ok(before)
    }

    /// Append an audit record. The sink is buffered and retried internally;
    /// an unavailable sink is surfaced as a warning, never as a failed
    /// transition.
    pub(crate) async fn audit(&self, record: AuditRecord) {
        if let Err(e) = self.audit_sink.append(record.clone()).await {
            warn!(
                plan_id = %record.plan_id,
                event_type = %record.event_type,
                error = %e,
                "audit append failed"
            );
        }
    }

    /// Bounded-time retrieval; failures and timeouts degrade to empty
    /// evidence plus a warning.
    pub(crate) async fn retrieve_evidence(
        &self,
        query: &str,
        k: usize,
    ) -> (Vec<Evidence>, Option<String>) {
        let attempt = tokio::time::timeout(
            self.config.retrieve_timeout,
            self.retriever.retrieve(query, k),
        )
        .await;
        match attempt {
            Ok(Ok(evidence)) => (evidence, None),
            Ok(Err(e)) => (Vec::new(), Some(format!("retrieval failed: {e}"))),
            Err(_) => (
                Vec::new(),
                Some(format!(
                    "retrieval timed out after {:?}",
                    self.config.retrieve_timeout
                )),
            ),
        }
    }

    /// Register a cancellation intent if a step loop is currently running
    /// for the plan. Returns whether a loop will observe it.
    fn request_cancel(&self, plan_id: &str, kind: CancelKind) -> bool {
        let active = self
            .active_loops
            .lock()
            .expect("active loop map lock poisoned");
        if let Some(token) = active.get(plan_id) {
            self.cancel_requests
                .lock()
                .expect("cancel request map lock poisoned")
                .insert(plan_id.to_string(), kind);
            token.cancel();
            true
        } else {
            false
        }
    }

    pub(crate) fn take_cancel_request(&self, plan_id: &str) -> Option<CancelKind> {
        self.cancel_requests
            .lock()
            .expect("cancel request map lock poisoned")
            .remove(plan_id)
    }

    /// Schedule the step loop on the worker pool.
    pub(crate) fn spawn_execute(self: &Arc<Self>, plan_id: PlanId) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let Ok(_permit) = this.pool.clone().acquire_owned().await else {
                return;
            };
            if this.shutdown_token.is_cancelled() {
                debug!(plan_id = %plan_id, "skipping execution, shutting down");
                return;
            }
            if let Err(e) = this.execute(&plan_id).await {
                error!(plan_id = %plan_id, error = %e, "execution task failed");
            }
        });

        let mut inflight = self.inflight.lock().expect("inflight lock poisoned");
        inflight.retain(|h| !h.is_finished());
        inflight.push(handle);
    }

    fn summarize(&self, plan: &DeploymentPlan) -> PlanSummary {
        PlanSummary {
            plan_id: plan.plan_id.clone(),
            status: plan.status,
            user_id: plan.user_id.clone(),
            intent: plan.intent.clone(),
            env: plan.env,
            endpoint_name: plan.artifact.as_ref().map(|a| a.endpoint_name.clone()),
            estimated_cost_usd_per_hour: plan
                .artifact
                .as_ref()
                .map(|a| self.guardrails.estimate_hourly_cost(a)),
            created_at: plan.created_at,
            updated_at: plan.updated_at,
        }
    }
}
