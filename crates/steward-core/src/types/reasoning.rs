//! Chain-of-thought reasoning traces emitted by agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single reasoning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// What the agent is thinking
    pub thought: String,
    /// Explicit reasoning / explanation
    pub reasoning: String,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    /// Alternative approaches considered
    #[serde(default)]
    pub alternatives: Vec<String>,
    /// Supporting evidence snippets
    #[serde(default)]
    pub evidence: Vec<String>,
    /// Decision made based on this reasoning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ReasoningStep {
    pub fn new(
        thought: impl Into<String>,
        reasoning: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            thought: thought.into(),
            reasoning: reasoning.into(),
            confidence: confidence.clamp(0.0, 1.0),
            alternatives: Vec::new(),
            evidence: Vec::new(),
            decision: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_alternatives(mut self, alternatives: Vec<String>) -> Self {
        self.alternatives = alternatives;
        self
    }

    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_decision(mut self, decision: impl Into<String>) -> Self {
        self.decision = Some(decision.into());
        self
    }
}

/// An ordered chain of reasoning steps with an overall confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningChain {
    /// Name of the agent that produced the chain
    pub agent: String,
    /// Context / situation being reasoned about
    pub context: String,
    pub steps: Vec<ReasoningStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
    /// Overall confidence in `[0, 1]`
    pub overall_confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl ReasoningChain {
    pub fn new(agent: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            context: context.into(),
            steps: Vec::new(),
            conclusion: None,
            overall_confidence: 0.5,
            created_at: Utc::now(),
        }
    }

    pub fn push(&mut self, step: ReasoningStep) {
        self.steps.push(step);
    }

    /// Overall confidence is the minimum of the step confidences.
    pub fn recompute_confidence(&mut self) {
        self.overall_confidence = self
            .steps
            .iter()
            .map(|s| s.confidence)
            .fold(f64::INFINITY, f64::min)
            .clamp(0.0, 1.0);
        if self.steps.is_empty() {
            self.overall_confidence = 0.5;
        }
    }

    pub fn conclude(&mut self, conclusion: impl Into<String>) {
        self.conclusion = Some(conclusion.into());
        self.recompute_confidence();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_confidence_is_minimum_of_steps() {
        let mut chain = ReasoningChain::new("planner", "test");
        chain.push(ReasoningStep::new("a", "r", 0.9));
        chain.push(ReasoningStep::new("b", "r", 0.6));
        chain.push(ReasoningStep::new("c", "r", 0.8));
        chain.recompute_confidence();
        assert_eq!(chain.overall_confidence, 0.6);
    }

    #[test]
    fn test_empty_chain_defaults_to_half_confidence() {
        let mut chain = ReasoningChain::new("planner", "test");
        chain.recompute_confidence();
        assert_eq!(chain.overall_confidence, 0.5);
    }

    #[test]
    fn test_step_confidence_clamped() {
        assert_eq!(ReasoningStep::new("t", "r", 1.4).confidence, 1.0);
        assert_eq!(ReasoningStep::new("t", "r", -0.5).confidence, 0.0);
    }
}
