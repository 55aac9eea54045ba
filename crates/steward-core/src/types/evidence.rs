//! Retrieved policy evidence.

use serde::{Deserialize, Serialize};

/// A retrieved policy snippet with a relevance score.
///
/// Sequences of evidence are ordered highest score first; equal scores are
/// tie-broken by `source` (document id) lexicographically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Document title
    pub title: String,
    /// Relevant text snippet
    pub snippet: String,
    /// Document id / URL if available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Relevance score in `[0, 1]`
    pub score: f64,
}

impl Evidence {
    pub fn new(title: impl Into<String>, snippet: impl Into<String>, score: f64) -> Self {
        Self {
            title: title.into(),
            snippet: snippet.into(),
            source: None,
            score: score.clamp(0.0, 1.0),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Sort evidence by descending score, ties broken by source id.
pub fn sort_evidence(evidence: &mut [Evidence]) {
    evidence.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.source.cmp(&b.source))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_evidence_is_deterministic_on_ties() {
        let mut evidence = vec![
            Evidence::new("b", "s", 0.5).with_source("doc-b"),
            Evidence::new("a", "s", 0.5).with_source("doc-a"),
            Evidence::new("c", "s", 0.9).with_source("doc-c"),
        ];
        sort_evidence(&mut evidence);
        let sources: Vec<_> = evidence.iter().filter_map(|e| e.source.as_deref()).collect();
        assert_eq!(sources, vec!["doc-c", "doc-a", "doc-b"]);
    }

    #[test]
    fn test_score_clamped_to_unit_interval() {
        assert_eq!(Evidence::new("t", "s", 1.7).score, 1.0);
        assert_eq!(Evidence::new("t", "s", -0.2).score, 0.0);
    }
}
