//! Error types for the retrieval and answering pipeline.
//!
//! Every failure a query or indexing run can hit maps to one [`RagError`]
//! variant. The HTTP layer turns these into the JSON error contract; the CLI
//! prints them through `anyhow`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the loader, index, providers, and orchestrator.
#[derive(Debug, Error)]
pub enum RagError {
    /// The persisted index is missing or could not be read.
    #[error("failed to load index from {path}: {reason}")]
    IndexLoad { path: PathBuf, reason: String },

    /// The persisted index was readable but its contents are inconsistent.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// A vector's length disagrees with the index dimensionality.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Search was attempted against an index with zero entries.
    #[error("the index holds no entries")]
    EmptyIndex,

    /// The embedding service did not answer in time.
    #[error("embedding request timed out after {0}s")]
    EmbeddingTimeout(u64),

    /// The generation service did not answer in time.
    #[error("generation request timed out after {0}s")]
    GenerationTimeout(u64),

    /// A prompt template is missing a slot or names an unknown one.
    #[error("invalid prompt template: {0}")]
    InvalidTemplate(String),

    /// The hosted model credential is missing or was rejected.
    #[error("{0}")]
    UpstreamAuth(String),

    /// Non-timeout failure talking to the embedding service.
    #[error("embedding error ({provider}): {message}")]
    Embedding { provider: String, message: String },

    /// Non-timeout failure talking to the generation service.
    #[error("generation error: {0}")]
    Generation(String),

    /// Text could not be extracted from a source file.
    #[error("extraction failed for {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    /// Caller-supplied input was rejected before any work was done.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// True for failures a caller may reasonably retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingTimeout(_) | RagError::GenerationTimeout(_)
        )
    }

    pub(crate) fn embedding(provider: &str, message: impl Into<String>) -> Self {
        RagError::Embedding {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_are_retryable() {
        assert!(RagError::EmbeddingTimeout(30).is_retryable());
        assert!(RagError::GenerationTimeout(60).is_retryable());
        assert!(!RagError::EmptyIndex.is_retryable());
        assert!(!RagError::UpstreamAuth("no token".into()).is_retryable());
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = RagError::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 384, got 768");
    }
}
