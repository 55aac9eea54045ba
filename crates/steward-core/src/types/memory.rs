//! Agent memory entries
//!
//! Episodic entries record specific past outcomes; semantic entries carry
//! generalized patterns and lessons. Entries are immutable once written and
//! episodic entries expire by TTL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Environment;

/// Memory entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// A specific past event / outcome
    Episodic,
    /// A generalized rule or lesson
    Semantic,
}

/// How a past failure was eventually resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Retry,
    Replan,
}

/// Situation the memory was recorded in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
}

/// Outcome the memory records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Present when a failure was later resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

/// A single agent memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Assigned by the store on `put`
    #[serde(default)]
    pub memory_id: String,
    /// Writing agent name (`planner`, `executor`, `monitor`, `orchestrator`)
    pub agent: String,
    pub kind: MemoryKind,
    /// Short description of the event
    pub event: String,
    #[serde(default)]
    pub context: MemoryContext,
    #[serde(default)]
    pub outcome: MemoryOutcome,
    /// Pattern description; semantic entries only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Lesson learned; semantic entries only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Optional embedding for similarity recall
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl MemoryEntry {
    /// Create an episodic entry.
    pub fn episodic(agent: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            memory_id: String::new(),
            agent: agent.into(),
            kind: MemoryKind::Episodic,
            event: event.into(),
            context: MemoryContext::default(),
            outcome: MemoryOutcome::default(),
            pattern: None,
            lesson: None,
            timestamp: Utc::now(),
            embedding: None,
        }
    }

    /// Create a semantic pattern entry.
    pub fn semantic(
        agent: impl Into<String>,
        pattern: impl Into<String>,
        lesson: impl Into<String>,
    ) -> Self {
        let pattern = pattern.into();
        Self {
            memory_id: String::new(),
            agent: agent.into(),
            kind: MemoryKind::Semantic,
            event: format!("pattern: {pattern}"),
            context: MemoryContext::default(),
            outcome: MemoryOutcome {
                success: true,
                error: None,
                resolution: None,
            },
            pattern: Some(pattern),
            lesson: Some(lesson.into()),
            timestamp: Utc::now(),
            embedding: None,
        }
    }

    pub fn with_context(mut self, context: MemoryContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_outcome(mut self, outcome: MemoryOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Text searched during token-overlap recall.
    pub fn recall_text(&self) -> String {
        let mut text = self.event.clone();
        if let Some(intent) = &self.context.intent {
            text.push(' ');
            text.push_str(intent);
        }
        if let Some(action) = &self.context.action {
            text.push(' ');
            text.push_str(action);
        }
        if let Some(env) = &self.context.env {
            text.push(' ');
            text.push_str(env.as_str());
        }
        if let Some(error) = &self.outcome.error {
            text.push(' ');
            text.push_str(error);
        }
        text
    }
}
