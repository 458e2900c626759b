//! Indexing pipeline orchestration.
//!
//! Coordinates the offline build: loader → chunking → batched embedding →
//! [`VectorIndex`] → atomic persist. The index is rebuilt wholesale on every
//! run; a failure at any step leaves the previously persisted index intact.

use anyhow::{Context, Result};
use tracing::info;

use crate::chunk::chunk_documents;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::index::VectorIndex;
use crate::loader::load_documents;
use crate::models::Chunk;

/// Counts reported after an indexing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    pub documents: usize,
    pub chunks: usize,
    pub dims: usize,
}

/// `lore index`: build and persist the index described by `config`.
pub async fn run_index(config: &Config, dry_run: bool) -> Result<()> {
    if dry_run {
        let documents = load_documents(&config.documents)?;
        let chunks = chunk_documents(
            &documents,
            config.chunking.chunk_size,
            config.chunking.overlap,
        )?;
        println!("index (dry-run)");
        println!("  documents: {}", documents.len());
        println!("  chunks: {}", chunks.len());
        println!(
            "  embedding batches: {}",
            chunks.len().div_ceil(config.embedding.batch_size)
        );
        return Ok(());
    }

    let embedder = create_embedder(&config.embedding)?;
    let (index, summary) = build_index(config, embedder.as_ref()).await?;
    index
        .persist(&config.index.path)
        .with_context(|| format!("Failed to write index to {}", config.index.path.display()))?;

    println!("index");
    println!("  documents: {}", summary.documents);
    println!("  chunks: {}", summary.chunks);
    println!("  dims: {}", summary.dims);
    println!("  model: {}", embedder.model_name());
    println!("  written: {}", config.index.path.display());
    println!("ok");
    Ok(())
}

/// Load, chunk, and embed the configured documents into a new index.
pub async fn build_index(
    config: &Config,
    embedder: &dyn Embedder,
) -> Result<(VectorIndex, IndexSummary)> {
    let documents = load_documents(&config.documents)?;
    let chunks = chunk_documents(
        &documents,
        config.chunking.chunk_size,
        config.chunking.overlap,
    )?;
    info!(
        documents = documents.len(),
        chunks = chunks.len(),
        "documents chunked"
    );

    let vectors = embed_chunks(embedder, &chunks, config.embedding.batch_size).await?;
    let entries: Vec<(Vec<f32>, Chunk)> = vectors.into_iter().zip(chunks).collect();
    let chunk_count = entries.len();

    let index = VectorIndex::build(entries, config.index.metric, embedder.model_name())?;
    let summary = IndexSummary {
        documents: documents.len(),
        chunks: chunk_count,
        dims: index.dims(),
    };
    Ok((index, summary))
}

/// Embed chunk texts in batches of `batch_size`, preserving order.
pub async fn embed_chunks(
    embedder: &dyn Embedder,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let total_batches = chunks.len().div_ceil(batch_size);
    let mut vectors = Vec::with_capacity(chunks.len());

    for (i, batch) in chunks.chunks(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder
            .embed(&texts)
            .await
            .with_context(|| format!("Embedding batch {}/{} failed", i + 1, total_batches))?;
        vectors.extend(embedded);
        info!(batch = i + 1, total = total_batches, "embedded batch");
    }
    Ok(vectors)
}
