//! Two-stage retrieval pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use steward_core::retriever::{EmbeddingClient, RerankClient, RetrievalError, Retriever};
use steward_core::similarity::{cosine, token_overlap};
use steward_core::types::{sort_evidence, Evidence};

use crate::index::{DocumentIndex, IndexedDocument};

const DEFAULT_SHORTLIST: usize = 20;
const SNIPPET_CHARS: usize = 200;

/// Embedding shortlist followed by cross-encoder rerank.
///
/// Missing embedder or reranker degrades to lexical scoring; the ordering
/// contract (descending score, ties by doc id) holds in every mode.
pub struct TwoStageRetriever {
    index: Arc<DocumentIndex>,
    embedder: Option<Arc<dyn EmbeddingClient>>,
    reranker: Option<Arc<dyn RerankClient>>,
    shortlist_size: usize,
    timeout: Duration,
}

impl TwoStageRetriever {
    pub fn new(index: Arc<DocumentIndex>, timeout: Duration) -> Self {
        Self {
            index,
            embedder: None,
            reranker: None,
            shortlist_size: DEFAULT_SHORTLIST,
            timeout,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingClient>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn RerankClient>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_shortlist_size(mut self, shortlist_size: usize) -> Self {
        self.shortlist_size = shortlist_size.max(1);
        self
    }

    /// Stage 1: score all documents and keep the best `shortlist_size`.
    async fn shortlist(&self, query: &str) -> Result<Vec<(IndexedDocument, f64)>, RetrievalError> {
        let documents = self.index.snapshot();
        if documents.is_empty() {
            warn!("document index is empty");
            return Ok(Vec::new());
        }

        let query_embedding = match &self.embedder {
            Some(embedder) => Some(embedder.embed(query).await?),
            None => None,
        };

        let mut scored: Vec<(IndexedDocument, f64)> = documents
            .into_iter()
            .map(|doc| {
                let score = match (&query_embedding, &doc.embedding) {
                    (Some(query_vec), Some(doc_vec)) => f64::from(cosine(query_vec, doc_vec)),
                    _ => {
                        let text = format!("{} {}", doc.title, doc.content);
                        f64::from(token_overlap(query, &text))
                    }
                };
                (doc, score)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.doc_id.cmp(&b.0.doc_id))
        });
        scored.truncate(self.shortlist_size);
        Ok(scored)
    }

    /// Stage 2: rerank the shortlist; without a reranker the shortlist
    /// scores stand.
    async fn rerank(
        &self,
        query: &str,
        shortlist: Vec<(IndexedDocument, f64)>,
    ) -> Result<Vec<(IndexedDocument, f64)>, RetrievalError> {
        let Some(reranker) = &self.reranker else {
            return Ok(shortlist);
        };
        if shortlist.is_empty() {
            return Ok(shortlist);
        }

        let passages: Vec<String> = shortlist.iter().map(|(d, _)| d.content.clone()).collect();
        let scores = reranker.rerank(query, &passages).await?;
        if scores.len() != passages.len() {
            return Err(RetrievalError::Rerank(format!(
                "expected {} scores, got {}",
                passages.len(),
                scores.len()
            )));
        }

        Ok(shortlist
            .into_iter()
            .zip(scores)
            .map(|((doc, _), score)| (doc, f64::from(score)))
            .collect())
    }

    async fn run(&self, query: &str, k: usize) -> Result<Vec<Evidence>, RetrievalError> {
        let shortlist = self.shortlist(query).await?;
        let reranked = self.rerank(query, shortlist).await?;

        let mut evidence: Vec<Evidence> = reranked
            .into_iter()
            .map(|(doc, score)| {
                let snippet: String = doc.content.chars().take(SNIPPET_CHARS).collect();
                Evidence::new(doc.title, snippet, score)
                    .with_source(doc.source.unwrap_or(doc.doc_id))
            })
            .collect();
        sort_evidence(&mut evidence);
        evidence.truncate(k);
        debug!(query, returned = evidence.len(), "retrieval completed");
        Ok(evidence)
    }
}

#[async_trait]
impl Retriever for TwoStageRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Evidence>, RetrievalError> {
        match tokio::time::timeout(self.timeout, self.run(query, k)).await {
            Ok(result) => result,
            Err(_) => Err(RetrievalError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_index() -> Arc<DocumentIndex> {
        let index = DocumentIndex::new();
        index.add(IndexedDocument::new(
            "doc-budget",
            "Budget policy",
            "dev deployments must stay under two dollars per hour",
        ));
        index.add(IndexedDocument::new(
            "doc-prod",
            "Prod policy",
            "prod deployments require approval and rollback alarms",
        ));
        index.add(IndexedDocument::new(
            "doc-instances",
            "Instance policy",
            "staging deployments allow ml.m5.large and ml.m5.xlarge",
        ));
        Arc::new(index)
    }

    struct FixedReranker(Vec<f32>);

    #[async_trait]
    impl RerankClient for FixedReranker {
        async fn rerank(
            &self,
            _query: &str,
            passages: &[String],
        ) -> Result<Vec<f32>, RetrievalError> {
            Ok(self.0.iter().copied().take(passages.len()).collect())
        }
    }

    struct StallingReranker;

    #[async_trait]
    impl RerankClient for StallingReranker {
        async fn rerank(
            &self,
            _query: &str,
            _passages: &[String],
        ) -> Result<Vec<f32>, RetrievalError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_lexical_fallback_orders_by_overlap() {
        let retriever = TwoStageRetriever::new(seeded_index(), Duration::from_secs(5));
        let evidence = retriever
            .retrieve("prod approval rollback alarms", 2)
            .await
            .unwrap();
        assert_eq!(evidence.len(), 2);
        assert_eq!(evidence[0].source.as_deref(), Some("doc-prod"));
        assert!(evidence[0].score >= evidence[1].score);
    }

    #[tokio::test]
    async fn test_result_length_bounded_by_k() {
        let retriever = TwoStageRetriever::new(seeded_index(), Duration::from_secs(5));
        let evidence = retriever.retrieve("deployments", 2).await.unwrap();
        assert!(evidence.len() <= 2);
    }

    #[tokio::test]
    async fn test_equal_scores_tie_break_by_doc_id() {
        let retriever = TwoStageRetriever::new(seeded_index(), Duration::from_secs(5))
            .with_reranker(Arc::new(FixedReranker(vec![0.5, 0.5, 0.5])));
        let evidence = retriever.retrieve("deployments", 3).await.unwrap();
        let sources: Vec<_> = evidence
            .iter()
            .filter_map(|e| e.source.as_deref())
            .collect();
        assert_eq!(sources, vec!["doc-budget", "doc-instances", "doc-prod"]);
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_retrieval_error() {
        let retriever = TwoStageRetriever::new(seeded_index(), Duration::from_millis(20))
            .with_reranker(Arc::new(StallingReranker));
        let result = retriever.retrieve("deployments", 3).await;
        assert!(matches!(result, Err(RetrievalError::Timeout)));
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty() {
        let retriever =
            TwoStageRetriever::new(Arc::new(DocumentIndex::new()), Duration::from_secs(5));
        let evidence = retriever.retrieve("anything", 3).await.unwrap();
        assert!(evidence.is_empty());
    }
}
