//! Question → top-k chunks.
//!
//! The [`Retriever`] embeds a question with the same [`Embedder`] the index
//! was built with and searches the shared [`VectorIndex`]. Embedding and
//! search failures are returned unchanged.

use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::models::RetrievalResult;

/// Read-only view over an embedder and a loaded index.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Self {
        Self { embedder, index }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Embed `question` as a query vector.
    pub async fn embed_question(&self, question: &str) -> Result<Vec<f32>> {
        self.embedder.embed_query(question).await
    }

    /// Search the index with an already-embedded query.
    pub fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        self.index.search(query, k)
    }

    /// Return up to `k` chunks most similar to `question`, best first.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<RetrievalResult> {
        let query = self.embed_question(question).await?;
        self.search(&query, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::error::RagError;
    use crate::index::Metric;
    use crate::models::Chunk;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.into(),
            document_id: id.into(),
            source_path: format!("{}.pdf", id),
            page_number: 1,
            chunk_index: 0,
            text: text.into(),
            start_offset: 0,
            end_offset: text.chars().count(),
            hash: String::new(),
        }
    }

    async fn retriever(texts: &[(&str, &str)]) -> Retriever {
        let embedder = Arc::new(HashingEmbedder::new(256));
        let mut entries = Vec::new();
        for (id, text) in texts {
            entries.push((embedder.embed_one(text), chunk(id, text)));
        }
        let index = VectorIndex::build(entries, Metric::Cosine, "hashing-256").unwrap();
        Retriever::new(embedder, Arc::new(index))
    }

    #[tokio::test]
    async fn test_retrieve_ranks_relevant_first() {
        let r = retriever(&[
            ("weapons", "The crossbow is found in the theater basement."),
            ("safe", "The safe code in the pharmacy is 2591."),
            ("story", "Ellie travels to Seattle with Dina."),
        ])
        .await;
        let results = r.retrieve("What is the pharmacy safe code?", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "safe");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_k_larger_than_index() {
        let r = retriever(&[("a", "alpha"), ("b", "beta")]).await;
        assert_eq!(r.retrieve("alpha", 10).await.unwrap().len(), 2);
        assert!(r.retrieve("alpha", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_error_propagates() {
        let r = Retriever::new(
            Arc::new(HashingEmbedder::new(16)),
            Arc::new(VectorIndex::build(Vec::new(), Metric::Cosine, "hashing-16").unwrap()),
        );
        assert!(matches!(
            r.retrieve("anything", 3).await,
            Err(RagError::EmptyIndex)
        ));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_propagates() {
        let index = VectorIndex::build(
            vec![(vec![1.0, 0.0, 0.0], chunk("a", "alpha"))],
            Metric::Cosine,
            "other",
        )
        .unwrap();
        let r = Retriever::new(Arc::new(HashingEmbedder::new(16)), Arc::new(index));
        assert!(matches!(
            r.retrieve("alpha", 1).await,
            Err(RagError::DimensionMismatch { expected: 3, actual: 16 })
        ));
    }
}
