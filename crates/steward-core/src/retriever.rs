//! Retrieval seam
//!
//! Two-stage retrieval (embedding shortlist, then rerank) lives behind one
//! trait; both stages are external collaborators. The pipeline implementation
//! is in the steward-retrieval crate.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::Evidence;

/// Retrieval errors.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("rerank error: {0}")]
    Rerank(String),
    #[error("retrieval timed out")]
    Timeout,
    #[error("internal error: {0}")]
    Internal(String),
}

/// Query-to-evidence retrieval.
///
/// Returned sequences are at most `k` long with monotonically non-increasing
/// scores; ties are broken by document id.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Evidence>, RetrievalError>;
}

/// Text embedding capability used for shortlisting and memory recall.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

/// Cross-encoder reranking capability.
///
/// Returns one score per passage, aligned by index.
#[async_trait]
pub trait RerankClient: Send + Sync {
    async fn rerank(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, RetrievalError>;
}
