//! Index statistics.
//!
//! `lore stats` loads the persisted index and prints what it holds: entry
//! and page counts, dimensionality, metric, the embedding model it was built
//! with, and a per-file breakdown.

use anyhow::{Context, Result};
use std::collections::BTreeMap;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::index::VectorIndex;

/// Chunk and page counts for one source file.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FileStats {
    pub pages: usize,
    pub chunks: usize,
}

/// Group index entries by source file, sorted by path.
pub fn per_file(index: &VectorIndex) -> BTreeMap<String, FileStats> {
    let mut files: BTreeMap<String, (FileStats, Vec<u32>)> = BTreeMap::new();
    for entry in index.entries() {
        let (stats, pages) = files.entry(entry.chunk.source_path.clone()).or_default();
        stats.chunks += 1;
        if !pages.contains(&entry.chunk.page_number) {
            pages.push(entry.chunk.page_number);
        }
    }
    files
        .into_iter()
        .map(|(path, (mut stats, pages))| {
            stats.pages = pages.len();
            (path, stats)
        })
        .collect()
}

/// Run the stats command.
pub fn run_stats(config: &Config) -> Result<()> {
    let path = &config.index.path;
    let index = VectorIndex::load(path)
        .with_context(|| "Run `lore index` to build the index first".to_string())?;
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    println!("Lorekeeper: Index Stats");
    println!("=======================");
    println!();
    println!("  Index:       {}", path.display());
    println!("  Size:        {}", format_bytes(size));
    println!("  Built:       {}", index.created_at().format("%Y-%m-%d %H:%M"));
    println!();
    println!("  Entries:     {}", index.len());
    println!("  Pages:       {}", index.document_count());
    println!("  Dims:        {}", index.dims());
    println!("  Metric:      {}", index.metric());
    println!("  Model:       {}", index.embedding_model());
    let configured = create_embedder(&config.embedding)?;
    if index.embedding_model() != configured.model_name() {
        println!(
            "  Warning:     configured embedding model is {}; rebuild the index",
            configured.model_name()
        );
    }

    let files = per_file(&index);
    if !files.is_empty() {
        println!();
        println!("  By file:");
        println!("  {:<48} {:>6} {:>8}", "FILE", "PAGES", "CHUNKS");
        println!("  {}", "-".repeat(64));
        for (file, stats) in &files {
            println!("  {:<48} {:>6} {:>8}", file, stats.pages, stats.chunks);
        }
    }
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
