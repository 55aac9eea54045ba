//! The step loop: cooperative execution with retry, backoff and bounded
//! replanning.
//!
//! At most one loop runs per plan id; the loop holds the plan's lock for its
//! whole run and observes cancellation only at step boundaries, so a step in
//! flight always completes and has its outcome recorded.

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use steward_core::agent::{MonitorDecision, ReplanRequest};
use steward_core::types::{
    AuditEventType, AuditRecord, CorrelationId, DeploymentPlan, MemoryContext, MemoryEntry,
    MemoryOutcome, PlanStatus, Resolution, StepOutcome, StepStatus, TaskStep,
};

use crate::backoff::backoff_delay;
use crate::orchestrator::{CancelKind, DeleteOutcome, Orchestrator, OrchestratorError, SYSTEM_ACTOR};

/// What the loop should do after one step was processed.
enum StepSignal {
    Continue,
    PlanFailed,
}

impl Orchestrator {
    /// Run the step loop for a plan in `deploying`.
    pub(crate) async fn execute(&self, plan_id: &str) -> Result<(), OrchestratorError> {
        let lock = self.plan_lock(plan_id);
        let _guard = lock.lock().await;

        // A cancel request aimed at an earlier loop must not leak into this
        // run.
        self.take_cancel_request(plan_id);

        let mut plan = self.load_plan(plan_id).await?;
        if plan.status != PlanStatus::Deploying {
            // A stale task: the plan moved on (deleted, paused) before the
            // worker picked it up.
            debug!(plan_id, status = %plan.status, "skipping execution for non-deploying plan");
            return Ok(());
        }

        let token = CancellationToken::new();
        self.active_loops
            .lock()
            .expect("active loop map lock poisoned")
            .insert(plan_id.to_string(), token.clone());

        let result = self.run_step_loop(&mut plan, &token).await;

        self.active_loops
            .lock()
            .expect("active loop map lock poisoned")
            .remove(plan_id);
        result
    }

    async fn run_step_loop(
        &self,
        plan: &mut DeploymentPlan,
        token: &CancellationToken,
    ) -> Result<(), OrchestratorError> {
        loop {
            if self.shutdown_token.is_cancelled() {
                info!(plan_id = %plan.plan_id, "draining step loop for shutdown");
                return Ok(());
            }
            if token.is_cancelled() {
                let Some(kind) = self.take_cancel_request(&plan.plan_id) else {
                    return Ok(());
                };
                return self.apply_cancel(plan, kind).await;
            }

            let next = plan
                .execution_plan
                .as_ref()
                .ok_or_else(|| {
                    OrchestratorError::Internal("deploying plan has no execution plan".to_string())
                })?
                .next_runnable();
            let Some(idx) = next else {
                break;
            };

            match self.run_step(plan, idx).await? {
                StepSignal::Continue => {}
                StepSignal::PlanFailed => return Ok(()),
            }
        }

        let complete = plan
            .execution_plan
            .as_ref()
            .map(|ep| ep.is_complete())
            .unwrap_or(false);
        if !complete {
            return Err(OrchestratorError::Internal(
                "step loop ended with unfinished steps".to_string(),
            ));
        }

        let before = self.transition(plan, PlanStatus::Deployed)?;
        self.plan_store.put(plan).await?;
        self.audit(
            AuditRecord::new(&plan.plan_id, AuditEventType::Deployed, SYSTEM_ACTOR)
                .with_transition(before, PlanStatus::Deployed),
        )
        .await;
        info!(plan_id = %plan.plan_id, replans = plan.replan_count, "deployment completed");

        self.kernel
            .remember(
                MemoryEntry::episodic(
                    SYSTEM_ACTOR,
                    format!("deployment completed: {}", plan.intent),
                )
                .with_context(MemoryContext {
                    intent: Some(plan.intent.clone()),
                    env: Some(plan.env),
                    action: None,
                    plan_id: Some(plan.plan_id.clone()),
                })
                .with_outcome(MemoryOutcome {
                    success: true,
                    error: None,
                    resolution: None,
                }),
            )
            .await;
        Ok(())
    }

    /// Execute one step and apply the monitor's decision.
    async fn run_step(
        &self,
        plan: &mut DeploymentPlan,
        idx: usize,
    ) -> Result<StepSignal, OrchestratorError> {
        let (snapshot, first_attempt) = {
            let step = Self::step_mut(plan, idx)?;
            let first_attempt = step.status != StepStatus::Retrying;
            step.set_status(StepStatus::Executing);
            (step.clone(), first_attempt)
        };
        self.plan_store.put(plan).await?;
        if first_attempt {
            self.audit(
                AuditRecord::new(&plan.plan_id, AuditEventType::StepStarted, SYSTEM_ACTOR)
                    .with_metadata(json!({
                        "step_id": snapshot.step_id.clone(),
                        "action": snapshot.action.clone(),
                        "agent": snapshot.agent.as_str(),
                    })),
            )
            .await;
        }

        let snapshot = self.augment_with_context(plan, idx, snapshot).await?;
        let outcome = self.executor.execute(&snapshot, plan).await;

        let recalled = if outcome.is_success() {
            Vec::new()
        } else {
            let query = format!(
                "{} {}",
                snapshot.action,
                outcome.error.as_deref().unwrap_or("")
            );
            self.kernel.recall(snapshot.agent.as_str(), &query).await
        };
        let mut decision = self.monitor.classify(&snapshot, &outcome, &recalled).await;

        // A retry endorsed by the monitor can still be vetoed by memory of
        // the same failure never resolving.
        if decision == MonitorDecision::Retry {
            let endorsed = self
                .kernel
                .should_retry_based_on_memory(
                    snapshot.agent.as_str(),
                    &snapshot.action,
                    outcome.error.as_deref().unwrap_or(""),
                )
                .await;
            if !endorsed {
                info!(
                    plan_id = %plan.plan_id,
                    step_id = %snapshot.step_id,
                    "memory vetoed retry, escalating to replan"
                );
                decision = MonitorDecision::Replan;
            }
        }

        match decision {
            MonitorDecision::Accept => {
                let retries_used = {
                    let step = Self::step_mut(plan, idx)?;
                    step.output = outcome.output.clone();
                    step.error = None;
                    let skipped = step
                        .output
                        .get("skipped")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    step.set_status(if skipped {
                        StepStatus::Skipped
                    } else {
                        StepStatus::Completed
                    });
                    step.retry_count
                };
                self.plan_store.put(plan).await?;
                self.audit(
                    AuditRecord::new(&plan.plan_id, AuditEventType::StepCompleted, SYSTEM_ACTOR)
                        .with_metadata(json!({
                            "step_id": snapshot.step_id.clone(),
                            "action": snapshot.action.clone(),
                            "retry_count": retries_used,
                        })),
                )
                .await;

                if retries_used > 0 {
                    // Record that this failure shape resolved by retrying.
                    self.kernel
                        .remember(
                            MemoryEntry::episodic(
                                snapshot.agent.as_str(),
                                format!("{} succeeded after retries", snapshot.action),
                            )
                            .with_context(MemoryContext {
                                intent: Some(plan.intent.clone()),
                                env: Some(plan.env),
                                action: Some(snapshot.action.clone()),
                                plan_id: Some(plan.plan_id.clone()),
                            })
                            .with_outcome(MemoryOutcome {
                                success: true,
                                error: None,
                                resolution: Some(Resolution::Retry),
                            }),
                        )
                        .await;
                }
                Ok(StepSignal::Continue)
            }
            MonitorDecision::Retry => {
                let retry_count = {
                    let step = Self::step_mut(plan, idx)?;
                    step.retry_count += 1;
                    step.error = outcome.error.clone();
                    step.set_status(StepStatus::Retrying);
                    step.retry_count
                };
                self.plan_store.put(plan).await?;
                self.audit(
                    AuditRecord::new(&plan.plan_id, AuditEventType::StepRetried, SYSTEM_ACTOR)
                        .with_metadata(json!({
                            "step_id": snapshot.step_id.clone(),
                            "action": snapshot.action.clone(),
                            "retry_count": retry_count,
                            "error": outcome.error.clone(),
                        })),
                )
                .await;
                self.kernel
                    .remember(
                        MemoryEntry::episodic(
                            snapshot.agent.as_str(),
                            format!("{} failed: {}", snapshot.action,
                                outcome.error.as_deref().unwrap_or("unknown error")),
                        )
                        .with_context(MemoryContext {
                            intent: Some(plan.intent.clone()),
                            env: Some(plan.env),
                            action: Some(snapshot.action.clone()),
                            plan_id: Some(plan.plan_id.clone()),
                        })
                        .with_outcome(MemoryOutcome {
                            success: false,
                            error: outcome.error.clone(),
                            resolution: None,
                        }),
                    )
                    .await;

                let delay = backoff_delay(
                    self.config.backoff_base,
                    self.config.backoff_max,
                    retry_count,
                );
                debug!(
                    plan_id = %plan.plan_id,
                    step_id = %snapshot.step_id,
                    retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "backing off before retry"
                );
                tokio::time::sleep(delay).await;
                Ok(StepSignal::Continue)
            }
            MonitorDecision::Replan => {
                match self.replan_after_failure(plan, idx, &outcome).await {
                    Ok(()) => Ok(StepSignal::Continue),
                    Err(OrchestratorError::ReplanBudgetExhausted(_)) => {
                        let error = format!(
                            "replan_budget_exhausted after {} replans: {}",
                            plan.replan_count,
                            outcome.error.as_deref().unwrap_or("step failed")
                        );
                        self.fail_plan(plan, idx, error).await?;
                        Ok(StepSignal::PlanFailed)
                    }
                    Err(OrchestratorError::Planner(e)) => {
                        self.fail_plan(plan, idx, format!("replanning failed: {e}"))
                            .await?;
                        Ok(StepSignal::PlanFailed)
                    }
                    Err(e) => Err(e),
                }
            }
            MonitorDecision::Fail => {
                let error = outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "step failed".to_string());
                self.fail_plan(plan, idx, error).await?;
                Ok(StepSignal::PlanFailed)
            }
        }
    }

    /// Iterative retrieval: attach fresh evidence to steps that ask for it.
    async fn augment_with_context(
        &self,
        plan: &mut DeploymentPlan,
        idx: usize,
        mut snapshot: TaskStep,
    ) -> Result<TaskStep, OrchestratorError> {
        let wants_context = snapshot
            .input
            .get("requires_context")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !wants_context {
            return Ok(snapshot);
        }

        let query = snapshot
            .input
            .get("context_query")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} {} {}", snapshot.action, plan.intent, plan.env));
        let (extra, warning) = self
            .retrieve_evidence(&query, self.config.top_k_iterative)
            .await;
        if let Some(warning) = warning {
            plan.warnings.push(warning);
        }
        if extra.is_empty() {
            return Ok(snapshot);
        }

        info!(
            plan_id = %plan.plan_id,
            step_id = %snapshot.step_id,
            documents = extra.len(),
            "attached iterative retrieval context"
        );
        let value = serde_json::to_value(&extra)
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?;
        snapshot.input.insert("additional_context".to_string(), value);
        {
            let step = Self::step_mut(plan, idx)?;
            step.input = snapshot.input.clone();
        }
        self.plan_store.put(plan).await?;
        Ok(snapshot)
    }

    /// Replanning subroutine: bounded by the replan budget, grounded in
    /// extra retrieval over the failure, merged over the completed prefix.
    async fn replan_after_failure(
        &self,
        plan: &mut DeploymentPlan,
        idx: usize,
        outcome: &StepOutcome,
    ) -> Result<(), OrchestratorError> {
        if plan.replan_count >= self.config.max_replans {
            return Err(OrchestratorError::ReplanBudgetExhausted(plan.plan_id.clone()));
        }

        let failed_step = {
            let step = Self::step_mut(plan, idx)?;
            step.set_status(StepStatus::Failed);
            step.error = outcome.error.clone();
            step.needs_replan = true;
            step.clone()
        };

        let query = format!(
            "alternative approach for {} {}",
            failed_step.action,
            failed_step.error.as_deref().unwrap_or("")
        );
        let (extra, warning) = self
            .retrieve_evidence(&query, self.config.top_k_iterative)
            .await;
        if let Some(warning) = warning {
            plan.warnings.push(warning);
        }
        let mut evidence = plan.evidence.clone();
        evidence.extend(extra);

        let attempt = plan.replan_count + 1;
        let current_plan = plan.execution_plan.clone().ok_or_else(|| {
            OrchestratorError::Internal("replanning a plan with no execution plan".to_string())
        })?;
        info!(
            plan_id = %plan.plan_id,
            failed_action = %failed_step.action,
            attempt,
            "triggering replanning"
        );

        let request = ReplanRequest {
            plan_id: plan.plan_id.clone(),
            intent: plan.intent.clone(),
            env: plan.env,
            current_plan,
            failed_step: failed_step.clone(),
            evidence,
            constraints: plan.constraints.clone(),
            attempt,
            correlation_id: CorrelationId::generate(),
        };
        let output = self.planner.replan(&request).await?;

        let merged = plan
            .execution_plan
            .as_ref()
            .ok_or_else(|| {
                OrchestratorError::Internal("execution plan vanished during replan".to_string())
            })?
            .merge_replanned(output.execution_plan);
        plan.artifact = Some(output.artifact);
        plan.execution_plan = Some(merged);
        plan.replan_count = attempt;
        self.plan_store.put(plan).await?;
        self.audit(
            AuditRecord::new(&plan.plan_id, AuditEventType::Replan, SYSTEM_ACTOR).with_metadata(
                json!({
                    "failed_step": failed_step.step_id,
                    "failed_action": failed_step.action,
                    "attempt": attempt,
                }),
            ),
        )
        .await;
        Ok(())
    }

    /// Terminal failure: mark the step permanently failed and the plan
    /// failed.
    async fn fail_plan(
        &self,
        plan: &mut DeploymentPlan,
        idx: usize,
        error: String,
    ) -> Result<(), OrchestratorError> {
        let failed_step = {
            let step = Self::step_mut(plan, idx)?;
            step.set_status(StepStatus::FailedPermanently);
            step.error = Some(error.clone());
            step.clone()
        };
        let before = self.transition(plan, PlanStatus::Failed)?;
        self.plan_store.put(plan).await?;

        self.audit(
            AuditRecord::new(&plan.plan_id, AuditEventType::StepFailed, SYSTEM_ACTOR)
                .with_metadata(json!({
                    "step_id": failed_step.step_id.clone(),
                    "action": failed_step.action.clone(),
                    "error": error.clone(),
                })),
        )
        .await;
        self.audit(
            AuditRecord::new(&plan.plan_id, AuditEventType::Failed, SYSTEM_ACTOR)
                .with_transition(before, PlanStatus::Failed)
                .with_metadata(json!({ "error": error.clone() })),
        )
        .await;
        warn!(plan_id = %plan.plan_id, error = %error, "plan failed");

        self.kernel
            .remember(
                MemoryEntry::episodic(
                    SYSTEM_ACTOR,
                    format!("deployment failed at {}", failed_step.action),
                )
                .with_context(MemoryContext {
                    intent: Some(plan.intent.clone()),
                    env: Some(plan.env),
                    action: Some(failed_step.action.clone()),
                    plan_id: Some(plan.plan_id.clone()),
                })
                .with_outcome(MemoryOutcome {
                    success: false,
                    error: Some(error),
                    resolution: None,
                }),
            )
            .await;
        Ok(())
    }

    /// Handle a pause or delete observed at a step boundary.
    async fn apply_cancel(
        &self,
        plan: &mut DeploymentPlan,
        kind: CancelKind,
    ) -> Result<(), OrchestratorError> {
        match kind {
            CancelKind::Pause => {
                let before = self.transition(plan, PlanStatus::Paused)?;
                self.plan_store.put(plan).await?;
                self.audit(
                    AuditRecord::new(&plan.plan_id, AuditEventType::Paused, SYSTEM_ACTOR)
                        .with_transition(before, PlanStatus::Paused),
                )
                .await;
                info!(plan_id = %plan.plan_id, "plan paused at step boundary");
                Ok(())
            }
            CancelKind::Delete { hard } => {
                let outcome = self.finish_delete(plan.clone(), hard, SYSTEM_ACTOR).await?;
                plan.set_status(PlanStatus::Deleted);
                info!(
                    plan_id = %plan.plan_id,
                    hard,
                    details = ?outcome.details,
                    "plan deleted at step boundary"
                );
                Ok(())
            }
        }
    }

    /// Complete a delete: transition, best-effort hard cleanup, audit.
    pub(crate) async fn finish_delete(
        &self,
        mut plan: DeploymentPlan,
        hard: bool,
        actor: &str,
    ) -> Result<DeleteOutcome, OrchestratorError> {
        let plan_id = plan.plan_id.clone();
        let before = self.transition(&mut plan, PlanStatus::Deleted)?;

        let mut details = Vec::new();
        if hard {
            if let Some(artifact) = &plan.artifact {
                let attempt = tokio::time::timeout(
                    self.config.backend_timeout,
                    self.backend.delete_endpoint(&artifact.endpoint_name),
                )
                .await;
                match attempt {
                    Ok(Ok(_)) => {
                        details.push(format!("endpoint {} deleted", artifact.endpoint_name));
                    }
                    Ok(Err(e)) => details.push(format!("endpoint delete failed: {e}")),
                    Err(_) => details.push("endpoint delete timed out".to_string()),
                }
            }
            match self.memory_store.remove_for_plan(&plan_id).await {
                Ok(removed) => details.push(format!("removed {removed} plan memories")),
                Err(e) => details.push(format!("memory cleanup failed: {e}")),
            }
            self.plan_store.remove(&plan_id).await?;
            details.push("plan row removed".to_string());
        } else {
            self.plan_store.put(&plan).await?;
        }

        self.audit(
            AuditRecord::new(&plan_id, AuditEventType::Deleted, actor)
                .with_transition(before, PlanStatus::Deleted)
                .with_metadata(json!({ "hard": hard, "details": details.clone() })),
        )
        .await;
        info!(plan_id = %plan_id, hard, "plan deleted");
        Ok(DeleteOutcome {
            plan_id,
            hard,
            details,
        })
    }

    fn step_mut(
        plan: &mut DeploymentPlan,
        idx: usize,
    ) -> Result<&mut TaskStep, OrchestratorError> {
        plan.execution_plan
            .as_mut()
            .and_then(|ep| ep.steps.get_mut(idx))
            .ok_or_else(|| {
                OrchestratorError::Internal(format!("step index {idx} out of bounds"))
            })
    }
}
