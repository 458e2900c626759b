//! Core data models used throughout the pipeline.
//!
//! Documents and chunks are produced once during indexing and never mutated
//! afterwards. Retrieval results, prompts, and answers are built fresh for
//! every request.

use serde::{Deserialize, Serialize};

/// One unit of extracted text: a single page of a PDF, or a whole text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// `<relative path>#p<page>`.
    pub id: String,
    /// Path relative to the configured documents root.
    pub source_path: String,
    pub raw_text: String,
    /// 1-based page number.
    pub page_number: u32,
}

/// A fixed-size, possibly overlapping window of a document's text.
///
/// Offsets are character offsets into [`Document::raw_text`], end exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub source_path: String,
    pub page_number: u32,
    pub chunk_index: u32,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A chunk paired with its similarity to the query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Ranked search output, most similar first, at most `k` long.
pub type RetrievalResult = Vec<ScoredChunk>;

/// Provenance attached to an answer when sources are requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub chunk_id: String,
    pub source_path: String,
    pub page_number: u32,
    pub score: f32,
    pub text: String,
}

impl From<&ScoredChunk> for Source {
    fn from(scored: &ScoredChunk) -> Self {
        Self {
            chunk_id: scored.chunk.id.clone(),
            source_path: scored.chunk.source_path.clone(),
            page_number: scored.chunk.page_number,
            score: scored.score,
            text: scored.chunk.text.clone(),
        }
    }
}

/// The generated answer, optionally with the chunks that grounded it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
}
