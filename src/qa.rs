//! The question-answering engine.
//!
//! [`QaEngine::answer`] runs one request through a linear pipeline:
//!
//! ```text
//! Idle → Embedding → Retrieving → PromptBuilding → Generating → Done
//!                          (any stage) ──▶ Failed
//! ```
//!
//! A failed stage ends the request with its [`RagError`]. Nothing is retried
//! and no shared state is touched: the index is read-only behind an `Arc`, so
//! one engine serves concurrent requests without locking.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{RagError, Result};
use crate::generation::{create_generator, Generator};
use crate::index::VectorIndex;
use crate::models::{Answer, Chunk, RetrievalResult, Source};
use crate::prompt::{assemble, PromptTemplate};
use crate::retrieve::Retriever;

/// Pipeline stage of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Embedding,
    Retrieving,
    PromptBuilding,
    Generating,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Embedding => "embedding",
            Stage::Retrieving => "retrieving",
            Stage::PromptBuilding => "prompt_building",
            Stage::Generating => "generating",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks the current stage and logs every transition.
struct StageTracker {
    stage: Stage,
}

impl StageTracker {
    fn new() -> Self {
        Self { stage: Stage::Idle }
    }

    fn enter(&mut self, next: Stage) {
        debug!(from = %self.stage, to = %next, "qa stage");
        self.stage = next;
    }

    /// Log the failure against the stage that produced it.
    fn fail(&mut self, err: RagError) -> RagError {
        warn!(stage = %self.stage, error = %err, "qa request failed");
        self.stage = Stage::Failed;
        err
    }
}

/// Retrieval-augmented answering over one loaded index.
pub struct QaEngine {
    retriever: Retriever,
    template: PromptTemplate,
    generator: Arc<dyn Generator>,
    k: usize,
}

impl QaEngine {
    pub fn new(
        retriever: Retriever,
        template: PromptTemplate,
        generator: Arc<dyn Generator>,
        k: usize,
    ) -> Self {
        Self {
            retriever,
            template,
            generator,
            k,
        }
    }

    /// Build the engine from configuration.
    ///
    /// Loads the persisted index, validates the prompt template and creates
    /// both providers. Any failure here is fatal: there is nothing to serve
    /// without an index and a usable template.
    pub fn from_config(config: &Config) -> Result<Self> {
        let index = VectorIndex::load(&config.index.path)?;
        let template = match config.prompt.template.as_deref() {
            Some(text) => PromptTemplate::new(text)?,
            None => PromptTemplate::default(),
        };
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;

        Ok(Self::from_parts(
            Arc::new(index),
            embedder,
            generator,
            template,
            config.retrieval.k,
        ))
    }

    /// Assemble an engine from an already-loaded index and providers.
    pub fn from_parts(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        template: PromptTemplate,
        k: usize,
    ) -> Self {
        if index.embedding_model() != embedder.model_name() {
            warn!(
                index_model = index.embedding_model(),
                configured_model = embedder.model_name(),
                "index was built with a different embedding model; rebuild it with `lore index`"
            );
        }
        info!(
            entries = index.len(),
            dims = index.dims(),
            metric = %index.metric(),
            generator = generator.model_name(),
            k,
            "qa engine ready"
        );
        Self::new(Retriever::new(embedder, index), template, generator, k)
    }

    pub fn index(&self) -> &VectorIndex {
        self.retriever.index()
    }

    /// Default number of chunks retrieved per question.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Answer `question` with the configured `k`.
    pub async fn answer(&self, question: &str, return_sources: bool) -> Result<Answer> {
        self.answer_with_k(question, self.k, return_sources).await
    }

    /// Answer `question` from the `k` most similar chunks.
    ///
    /// With `return_sources` the answer carries the provenance of every chunk
    /// that went into the prompt, best first.
    pub async fn answer_with_k(
        &self,
        question: &str,
        k: usize,
        return_sources: bool,
    ) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidInput("No text provided".to_string()));
        }

        let mut tracker = StageTracker::new();

        tracker.enter(Stage::Embedding);
        let query = self
            .retriever
            .embed_question(question)
            .await
            .map_err(|e| tracker.fail(e))?;

        tracker.enter(Stage::Retrieving);
        let results = self
            .retriever
            .search(&query, k)
            .map_err(|e| tracker.fail(e))?;

        tracker.enter(Stage::PromptBuilding);
        let chunks: Vec<Chunk> = results.iter().map(|r| r.chunk.clone()).collect();
        let prompt = assemble(question, &chunks, &self.template);
        debug!(chunks = chunks.len(), prompt_chars = prompt.len(), "prompt assembled");

        tracker.enter(Stage::Generating);
        let text = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| tracker.fail(e))?;

        tracker.enter(Stage::Done);
        Ok(Answer {
            text,
            sources: return_sources.then(|| sources_of(&results)),
        })
    }
}

fn sources_of(results: &RetrievalResult) -> Vec<Source> {
    results.iter().map(Source::from).collect()
}
