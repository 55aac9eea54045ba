//! # Steward Retrieval
//!
//! Two-stage retrieval pipeline: embed the query, shortlist candidates from
//! an in-memory index by cosine similarity, then rerank the shortlist with a
//! cross-encoder capability. Both stages are external collaborators behind
//! the `EmbeddingClient` / `RerankClient` seams; either may be absent, in
//! which case the pipeline falls back to lexical token-overlap scoring.

mod index;
mod pipeline;

pub use index::{DocumentIndex, IndexedDocument};
pub use pipeline::TwoStageRetriever;
