//! ReactPlanner - ReAct planning loop
//!
//! Think: recall similar prior deployments and form an approach.
//! Act: synthesize a deployment artifact from the prompt.
//! Observe: self-check the artifact structure, repairing once.
//! Reflect: write an episodic memory of the planning session.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use steward_core::agent::{PlanError, PlanRequest, PlannerAgent, PlannerOutput, ReplanRequest};
use steward_core::synthesizer::Synthesizer;
use steward_core::types::{
    is_valid_resource_name, AgentKind, Constraints, DeploymentArtifact, Environment, Evidence,
    ExecutionPlan, MemoryContext, MemoryEntry, MemoryKind, MemoryOutcome, PlanId, ReasoningStep,
    Resolution, TaskStep,
};

use crate::kernel::AgentKernel;

const AGENT: &str = "planner";
const EVIDENCE_IN_PROMPT: usize = 3;
const SNIPPET_IN_PROMPT: usize = 200;

/// The default step template every plan starts from.
const STEP_TEMPLATE: &[(AgentKind, &str)] = &[
    (AgentKind::Retriever, "retrieve_policies"),
    (AgentKind::Planner, "generate_config"),
    (AgentKind::Executor, "validate_plan"),
    (AgentKind::Executor, "create_model"),
    (AgentKind::Executor, "create_endpoint_config"),
    (AgentKind::Executor, "create_endpoint"),
    (AgentKind::Monitor, "configure_monitoring"),
    (AgentKind::Monitor, "verify_deployment"),
];

/// ReAct planner over a synthesizer and the shared kernel.
pub struct ReactPlanner {
    synthesizer: Arc<dyn Synthesizer>,
    kernel: Arc<AgentKernel>,
}

impl ReactPlanner {
    pub fn new(synthesizer: Arc<dyn Synthesizer>, kernel: Arc<AgentKernel>) -> Self {
        Self { synthesizer, kernel }
    }

    fn build_prompt(
        intent: &str,
        env: Environment,
        evidence: &[Evidence],
        constraints: &Constraints,
        lessons: &[String],
        failure: Option<&str>,
        repair_gaps: Option<&[String]>,
    ) -> String {
        let mut prompt = String::new();
        let _ = writeln!(prompt, "User intent: {intent}");
        let _ = writeln!(prompt, "Target environment: {env}");

        if !evidence.is_empty() {
            let _ = writeln!(prompt, "\nRelevant policies:");
            for item in evidence.iter().take(EVIDENCE_IN_PROMPT) {
                let snippet: String = item.snippet.chars().take(SNIPPET_IN_PROMPT).collect();
                let _ = writeln!(prompt, "- {}: {}", item.title, snippet);
            }
        }

        if let Some(budget) = constraints.budget_usd_per_hour {
            let _ = writeln!(prompt, "\nBudget constraint: ${budget}/hour");
        }

        if !lessons.is_empty() {
            let _ = writeln!(prompt, "\nLessons from past deployments:");
            for lesson in lessons {
                let _ = writeln!(prompt, "- {lesson}");
            }
        }

        if let Some(failure) = failure {
            let _ = writeln!(prompt, "\nPrevious attempt failed: {failure}");
            let _ = writeln!(
                prompt,
                "Choose an alternative configuration that avoids this failure."
            );
        }

        if let Some(gaps) = repair_gaps {
            let _ = writeln!(prompt, "\nThe previous output had these problems:");
            for gap in gaps {
                let _ = writeln!(prompt, "- {gap}");
            }
            let _ = writeln!(prompt, "Fix them and return the corrected JSON object.");
        }

        prompt.push_str(
            "\nReturn ONE JSON object with fields: model_name, endpoint_name, \
             instance_type, instance_count, max_payload_mb, autoscaling_min, \
             autoscaling_max, rollback_alarms, budget_usd_per_hour. JSON only.\n",
        );
        prompt
    }

    /// Observe step: structural completeness check on the proposal.
    fn structural_gaps(artifact: &DeploymentArtifact) -> Vec<String> {
        let mut gaps = Vec::new();
        if !is_valid_resource_name(&artifact.model_name) {
            gaps.push(format!("invalid model_name '{}'", artifact.model_name));
        }
        if !is_valid_resource_name(&artifact.endpoint_name) {
            gaps.push(format!("invalid endpoint_name '{}'", artifact.endpoint_name));
        }
        if artifact.instance_type.is_empty() {
            gaps.push("instance_type is empty".to_string());
        }
        if !(1..=4).contains(&artifact.instance_count) {
            gaps.push(format!(
                "instance_count {} outside 1..=4",
                artifact.instance_count
            ));
        }
        if !(1..=100).contains(&artifact.max_payload_mb) {
            gaps.push(format!(
                "max_payload_mb {} outside 1..=100",
                artifact.max_payload_mb
            ));
        }
        if artifact.autoscaling_min > artifact.autoscaling_max {
            gaps.push("autoscaling_min exceeds autoscaling_max".to_string());
        }
        if artifact.budget_usd_per_hour < 0.0 {
            gaps.push("budget_usd_per_hour is negative".to_string());
        }
        gaps
    }

    /// Act + observe: synthesize, self-check, repair once.
    async fn synthesize_checked(
        &self,
        prompt: &str,
        rebuild_prompt: impl Fn(&[String]) -> String,
        thoughts: &mut Vec<ReasoningStep>,
    ) -> Result<DeploymentArtifact, PlanError> {
        let first = self.synthesizer.synthesize(prompt).await?;
        let gaps = Self::structural_gaps(&first);
        if gaps.is_empty() {
            thoughts.push(
                ReasoningStep::new(
                    "Validating synthesized configuration",
                    "Proposal passes the structural completeness check",
                    0.9,
                )
                .with_decision("accept proposal"),
            );
            return Ok(first);
        }

        warn!(gaps = gaps.len(), "synthesized artifact incomplete, retrying once");
        thoughts.push(
            ReasoningStep::new(
                "Validating synthesized configuration",
                format!("Proposal has structural gaps: {}", gaps.join("; ")),
                0.6,
            )
            .with_decision("retry synthesis with gaps appended"),
        );

        let repaired = self.synthesizer.synthesize(&rebuild_prompt(&gaps)).await?;
        let remaining = Self::structural_gaps(&repaired);
        if remaining.is_empty() {
            Ok(repaired)
        } else {
            Err(PlanError::SynthesisInvalid(remaining.join("; ")))
        }
    }

    /// Default step template with fresh ids for the given replan generation.
    fn template_steps(
        plan_id: &PlanId,
        intent: &str,
        env: Environment,
        generation: u32,
    ) -> Vec<TaskStep> {
        STEP_TEMPLATE
            .iter()
            .enumerate()
            .map(|(idx, (agent, action))| {
                let step_id = if generation == 0 {
                    format!("{plan_id}-step-{}", idx + 1)
                } else {
                    format!("{plan_id}-r{generation}-step-{}", idx + 1)
                };
                let input = json!({
                    "intent": intent,
                    "env": env.as_str(),
                    "step_index": idx,
                })
                .as_object()
                .cloned()
                .unwrap_or_default();
                TaskStep::new(step_id, *agent, *action).with_input(input)
            })
            .collect()
    }

    fn lessons_from(recalled: &[MemoryEntry]) -> Vec<String> {
        recalled
            .iter()
            .filter(|m| m.kind == MemoryKind::Semantic)
            .filter_map(|m| m.lesson.clone())
            .collect()
    }
}

#[async_trait]
impl PlannerAgent for ReactPlanner {
    async fn plan(&self, request: &PlanRequest) -> Result<PlannerOutput, PlanError> {
        let mut thoughts = Vec::new();

        // Think
        let recalled = self.kernel.recall(AGENT, &request.intent).await;
        thoughts.push(
            ReasoningStep::new(
                "Analyzing deployment requirements",
                format!(
                    "Plan '{}' for {} with {} evidence documents",
                    request.intent,
                    request.env,
                    request.evidence.len()
                ),
                0.9,
            )
            .with_alternatives(vec![
                "simple sequential plan".to_string(),
                "conservative step-by-step approach".to_string(),
            ])
            .with_evidence(request.evidence.iter().map(|e| e.title.clone()).collect())
            .with_decision("structured sequential plan with validation checkpoints"),
        );
        if !recalled.is_empty() {
            thoughts.push(
                ReasoningStep::new(
                    "Checking past similar deployments",
                    format!("Found {} similar past experiences", recalled.len()),
                    0.8,
                )
                .with_evidence(recalled.iter().take(2).map(|m| m.event.clone()).collect())
                .with_decision("apply insights from past deployments"),
            );
        }

        // Act + observe
        let lessons = Self::lessons_from(&recalled);
        let prompt = Self::build_prompt(
            &request.intent,
            request.env,
            &request.evidence,
            &request.constraints,
            &lessons,
            None,
            None,
        );
        let artifact = self
            .synthesize_checked(
                &prompt,
                |gaps| {
                    Self::build_prompt(
                        &request.intent,
                        request.env,
                        &request.evidence,
                        &request.constraints,
                        &lessons,
                        None,
                        Some(gaps),
                    )
                },
                &mut thoughts,
            )
            .await?;

        let steps = Self::template_steps(&request.plan_id, &request.intent, request.env, 0);
        let mut chain = self.kernel.build_reasoning_chain(
            AGENT,
            &format!("Planning deployment: {} for {}", request.intent, request.env),
            thoughts,
        );
        chain.conclude(format!("Created execution plan with {} steps", steps.len()));

        info!(
            plan_id = %request.plan_id,
            correlation_id = %request.correlation_id,
            steps = steps.len(),
            confidence = chain.overall_confidence,
            "planning completed"
        );

        // Reflect
        self.kernel
            .remember(
                MemoryEntry::episodic(AGENT, format!("planned deployment: {}", request.intent))
                    .with_context(MemoryContext {
                        intent: Some(request.intent.clone()),
                        env: Some(request.env),
                        action: Some("generate_config".to_string()),
                        plan_id: Some(request.plan_id.clone()),
                    })
                    .with_outcome(MemoryOutcome {
                        success: true,
                        error: None,
                        resolution: None,
                    }),
            )
            .await;

        Ok(PlannerOutput {
            artifact,
            execution_plan: ExecutionPlan::new(request.plan_id.clone(), steps)
                .with_reasoning(chain),
        })
    }

    async fn replan(&self, request: &ReplanRequest) -> Result<PlannerOutput, PlanError> {
        let failure = format!(
            "step '{}' failed: {}",
            request.failed_step.action,
            request.failed_step.error.as_deref().unwrap_or("unknown error")
        );

        let mut thoughts = vec![ReasoningStep::new(
            format!("Replanning after failure of {}", request.failed_step.action),
            format!("{failure}; adjusting the plan to work around the issue"),
            0.7,
        )
        .with_alternatives(vec![
            "use an alternative instance type".to_string(),
            "simplify the deployment".to_string(),
        ])
        .with_decision("replan with an alternative configuration")];

        let recalled = self
            .kernel
            .recall(AGENT, &format!("{} {}", request.intent, failure))
            .await;
        let lessons = Self::lessons_from(&recalled);

        let prompt = Self::build_prompt(
            &request.intent,
            request.env,
            &request.evidence,
            &request.constraints,
            &lessons,
            Some(&failure),
            None,
        );
        let artifact = self
            .synthesize_checked(
                &prompt,
                |gaps| {
                    Self::build_prompt(
                        &request.intent,
                        request.env,
                        &request.evidence,
                        &request.constraints,
                        &lessons,
                        Some(&failure),
                        Some(gaps),
                    )
                },
                &mut thoughts,
            )
            .await?;

        let steps = Self::template_steps(
            &request.plan_id,
            &request.intent,
            request.env,
            request.attempt,
        );
        let mut chain = self.kernel.build_reasoning_chain(
            AGENT,
            &format!(
                "Replanning deployment: {} after {} failure",
                request.intent, request.failed_step.action
            ),
            thoughts,
        );
        chain.conclude(format!(
            "Replanned with {} steps (attempt {})",
            steps.len(),
            request.attempt
        ));

        info!(
            plan_id = %request.plan_id,
            correlation_id = %request.correlation_id,
            attempt = request.attempt,
            failed_action = %request.failed_step.action,
            "replanning completed"
        );

        self.kernel
            .remember(
                MemoryEntry::episodic(
                    AGENT,
                    format!("replanned after {} failure", request.failed_step.action),
                )
                .with_context(MemoryContext {
                    intent: Some(request.intent.clone()),
                    env: Some(request.env),
                    action: Some(request.failed_step.action.clone()),
                    plan_id: Some(request.plan_id.clone()),
                })
                .with_outcome(MemoryOutcome {
                    success: true,
                    error: request.failed_step.error.clone(),
                    resolution: Some(Resolution::Replan),
                }),
            )
            .await;

        Ok(PlannerOutput {
            artifact,
            execution_plan: ExecutionPlan::new(request.plan_id.clone(), steps)
                .with_reasoning(chain),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use steward_core::synthesizer::SynthError;
    use steward_core::types::CorrelationId;
    use steward_stores::InMemoryMemoryStore;

    struct ScriptedSynthesizer {
        outputs: Mutex<Vec<DeploymentArtifact>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedSynthesizer {
        fn new(outputs: Vec<DeploymentArtifact>) -> Self {
            Self {
                outputs: Mutex::new(outputs),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Synthesizer for ScriptedSynthesizer {
        async fn synthesize(&self, prompt: &str) -> Result<DeploymentArtifact, SynthError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut outputs = self.outputs.lock().unwrap();
            if outputs.len() > 1 {
                Ok(outputs.remove(0))
            } else {
                outputs
                    .first()
                    .cloned()
                    .ok_or_else(|| SynthError::Llm("no scripted output".to_string()))
            }
        }
    }

    fn artifact(instance_type: &str) -> DeploymentArtifact {
        DeploymentArtifact {
            model_name: "llama-3-1-8b".to_string(),
            endpoint_name: "chatbot-x-staging".to_string(),
            instance_type: instance_type.to_string(),
            instance_count: 1,
            max_payload_mb: 6,
            autoscaling_min: 1,
            autoscaling_max: 2,
            rollback_alarms: vec![],
            budget_usd_per_hour: 15.0,
        }
    }

    fn planner(synth: Arc<ScriptedSynthesizer>) -> ReactPlanner {
        let memory = Arc::new(InMemoryMemoryStore::new(90));
        ReactPlanner::new(synth, Arc::new(AgentKernel::new(memory, 5, 2)))
    }

    fn plan_request() -> PlanRequest {
        PlanRequest {
            plan_id: "plan-1".to_string(),
            intent: "deploy llama for chatbot-x".to_string(),
            env: Environment::Staging,
            evidence: vec![Evidence::new("Policy", "staging allows ml.m5.large", 0.9)],
            constraints: Constraints::with_budget(15.0),
            correlation_id: CorrelationId::generate(),
        }
    }

    #[tokio::test]
    async fn test_plan_produces_default_template() {
        let synth = Arc::new(ScriptedSynthesizer::new(vec![artifact("ml.m5.large")]));
        let output = planner(synth).plan(&plan_request()).await.unwrap();

        let actions: Vec<&str> = output
            .execution_plan
            .steps
            .iter()
            .map(|s| s.action.as_str())
            .collect();
        assert_eq!(
            actions,
            vec![
                "retrieve_policies",
                "generate_config",
                "validate_plan",
                "create_model",
                "create_endpoint_config",
                "create_endpoint",
                "configure_monitoring",
                "verify_deployment",
            ]
        );
        assert_eq!(output.execution_plan.steps[0].step_id, "plan-1-step-1");
        assert!(output.execution_plan.reasoning_chain.is_some());
        assert_eq!(output.artifact.instance_type, "ml.m5.large");
    }

    #[tokio::test]
    async fn test_step_ids_are_unique() {
        let synth = Arc::new(ScriptedSynthesizer::new(vec![artifact("ml.m5.large")]));
        let output = planner(synth).plan(&plan_request()).await.unwrap();
        let mut ids: Vec<_> = output
            .execution_plan
            .steps
            .iter()
            .map(|s| s.step_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), output.execution_plan.steps.len());
    }

    #[tokio::test]
    async fn test_observe_repairs_invalid_proposal_once() {
        let mut broken = artifact("ml.m5.large");
        broken.instance_count = 9;
        let synth = Arc::new(ScriptedSynthesizer::new(vec![
            broken,
            artifact("ml.m5.large"),
        ]));
        let output = planner(synth.clone()).plan(&plan_request()).await.unwrap();
        assert_eq!(output.artifact.instance_count, 1);

        let prompts = synth.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("instance_count 9 outside 1..=4"));
    }

    #[tokio::test]
    async fn test_observe_gives_up_after_one_repair() {
        let mut broken = artifact("ml.m5.large");
        broken.instance_count = 9;
        let synth = Arc::new(ScriptedSynthesizer::new(vec![broken]));
        let result = planner(synth).plan(&plan_request()).await;
        assert!(matches!(result, Err(PlanError::SynthesisInvalid(_))));
    }

    #[tokio::test]
    async fn test_replan_uses_generation_scoped_step_ids() {
        let synth = Arc::new(ScriptedSynthesizer::new(vec![artifact("ml.m5.xlarge")]));
        let planner = planner(synth);
        let base = plan_request();

        let mut failed_step = TaskStep::new(
            "plan-1-step-6",
            AgentKind::Executor,
            "create_endpoint",
        );
        failed_step.error = Some("instance type not available".to_string());

        let output = planner
            .replan(&ReplanRequest {
                plan_id: base.plan_id.clone(),
                intent: base.intent.clone(),
                env: base.env,
                current_plan: ExecutionPlan::new(base.plan_id.clone(), vec![]),
                failed_step,
                evidence: base.evidence.clone(),
                constraints: base.constraints.clone(),
                attempt: 1,
                correlation_id: CorrelationId::generate(),
            })
            .await
            .unwrap();

        assert_eq!(output.execution_plan.steps[0].step_id, "plan-1-r1-step-1");
        assert_eq!(output.artifact.instance_type, "ml.m5.xlarge");
    }
}
