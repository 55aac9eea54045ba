//! In-memory policy document index.

use std::sync::RwLock;

/// A policy document held by the index.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    /// Stable document id; the retrieval tie-breaker
    pub doc_id: String,
    pub title: String,
    pub content: String,
    pub source: Option<String>,
    /// Precomputed content embedding, if the corpus was embedded at ingest
    pub embedding: Option<Vec<f32>>,
}

impl IndexedDocument {
    pub fn new(
        doc_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            title: title.into(),
            content: content.into(),
            source: None,
            embedding: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Shared in-memory document store for the retrieval shortlist stage.
#[derive(Default)]
pub struct DocumentIndex {
    documents: RwLock<Vec<IndexedDocument>>,
}

impl DocumentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, document: IndexedDocument) {
        self.documents
            .write()
            .expect("document index lock poisoned")
            .push(document);
    }

    pub fn len(&self) -> usize {
        self.documents
            .read()
            .expect("document index lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<IndexedDocument> {
        self.documents
            .read()
            .expect("document index lock poisoned")
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_add_and_snapshot() {
        let index = DocumentIndex::new();
        assert!(index.is_empty());
        index.add(IndexedDocument::new("d1", "Prod policy", "prod requires approval"));
        index.add(IndexedDocument::new("d2", "Budget policy", "dev budget is small"));
        assert_eq!(index.len(), 2);
        let docs = index.snapshot();
        assert_eq!(docs[0].doc_id, "d1");
        assert_eq!(docs[1].doc_id, "d2");
    }
}
