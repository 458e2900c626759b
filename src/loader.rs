//! Document loading from a directory of guides.
//!
//! Walks `documents.root`, keeps files matching the include globs (and not
//! the exclude globs), and turns each one into per-page [`Document`]s:
//!
//! | Extension | Handling |
//! |-----------|----------|
//! | `.pdf` | text extracted page by page with `pdf-extract` |
//! | `.txt`, `.md` | whole file as page 1 |
//!
//! Files are visited in sorted relative-path order, so repeated runs over the
//! same tree yield the same documents. A file that fails extraction is
//! skipped with a warning; blank pages are dropped.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::DocumentsConfig;
use crate::error::RagError;
use crate::models::Document;

/// Load every matching file under `config.root`.
///
/// Fails if the root is missing, a glob is invalid, or no document could be
/// loaded at all.
pub fn load_documents(config: &DocumentsConfig) -> Result<Vec<Document>> {
    let files = scan_files(config)?;
    let mut documents = Vec::new();
    let mut skipped = 0usize;

    for (path, rel) in &files {
        match load_file(path, rel) {
            Ok(docs) => {
                debug!(file = %rel, pages = docs.len(), "loaded");
                documents.extend(docs);
            }
            Err(e) => {
                warn!(file = %rel, error = %e, "skipping file");
                skipped += 1;
            }
        }
    }

    if documents.is_empty() {
        bail!(
            "No documents loaded from {} ({} files matched, {} failed)",
            config.root.display(),
            files.len(),
            skipped
        );
    }
    Ok(documents)
}

/// List matching files as `(absolute path, relative path)`, sorted.
pub fn scan_files(config: &DocumentsConfig) -> Result<Vec<(PathBuf, String)>> {
    let root = &config.root;
    if !root.is_dir() {
        bail!("Documents root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string()];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push((path.to_path_buf(), rel_str));
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// Read one file into its non-blank pages.
pub fn load_file(path: &Path, relative_path: &str) -> std::result::Result<Vec<Document>, RagError> {
    let pages = extract_pages(path)?;
    Ok(pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, raw_text)| {
            let page_number = i as u32 + 1;
            Document {
                id: format!("{}#p{}", relative_path, page_number),
                source_path: relative_path.to_string(),
                raw_text,
                page_number,
            }
        })
        .collect())
}

/// Extract the text of each page, in page order.
pub fn extract_pages(path: &Path) -> std::result::Result<Vec<String>, RagError> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => {
            let bytes = std::fs::read(path)?;
            pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| {
                RagError::Extraction {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            })
        }
        "txt" | "md" => Ok(vec![std::fs::read_to_string(path)?]),
        other => Err(RagError::Extraction {
            path: path.to_path_buf(),
            reason: format!("unsupported file type '{}'", other),
        }),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
