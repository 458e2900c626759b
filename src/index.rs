//! Flat exact-search vector index with atomic on-disk persistence.
//!
//! The index is a plain array of `(vector, chunk)` entries scanned in full on
//! every query. At guide-corpus scale (a few thousand chunks) this is fast,
//! has no approximation error, and persists trivially.
//!
//! An index is built once, wholesale, and never mutated afterwards. Readers
//! share it behind an `Arc` with no locking.
//!
//! # On-disk format
//!
//! A single JSON document:
//!
//! ```text
//! {
//!   "format_version": 1,
//!   "metric": "cosine",
//!   "dims": 384,
//!   "embedding_model": "...",
//!   "created_at": "2024-01-01T00:00:00Z",
//!   "checksum": "<sha256 of vector bytes + chunk JSON>",
//!   "vectors": "<base64 of little-endian f32s, row-major>",
//!   "chunks": [ { ...chunk metadata... }, ... ]
//! }
//! ```
//!
//! [`VectorIndex::persist`] writes to a temporary file in the destination
//! directory and renames it into place, so a reader sees either the old file
//! or the complete new one.

use std::io::{BufWriter, Write};
use std::path::Path;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::models::{Chunk, RetrievalResult, ScoredChunk};

const FORMAT_VERSION: u32 = 1;

/// Similarity function used to rank entries. Higher scores are more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine of the angle between vectors, in `[-1, 1]`.
    #[default]
    Cosine,
    /// Raw inner product. Equivalent to cosine for unit-length vectors.
    Dot,
    /// `1 / (1 + ‖a - b‖)`, in `(0, 1]`.
    Euclidean,
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Metric::Cosine => "cosine",
            Metric::Dot => "dot",
            Metric::Euclidean => "euclidean",
        };
        f.write_str(name)
    }
}

/// One stored vector and the chunk it was computed from.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// In-memory flat index.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dims: usize,
    metric: Metric,
    embedding_model: String,
    created_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
    /// L2 norm of each entry's vector, parallel to `entries`.
    norms: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    format_version: u32,
    metric: Metric,
    dims: usize,
    embedding_model: String,
    created_at: DateTime<Utc>,
    checksum: String,
    vectors: String,
    chunks: Vec<Chunk>,
}

impl VectorIndex {
    /// Build an index from scratch.
    ///
    /// Dimensionality is taken from the first vector; every other vector must
    /// match it. An empty entry list builds an empty index, which fails every
    /// search with [`RagError::EmptyIndex`].
    pub fn build(
        entries: Vec<(Vec<f32>, Chunk)>,
        metric: Metric,
        embedding_model: impl Into<String>,
    ) -> Result<Self> {
        Self::assemble(entries, metric, embedding_model.into(), Utc::now())
    }

    fn assemble(
        entries: Vec<(Vec<f32>, Chunk)>,
        metric: Metric,
        embedding_model: String,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let dims = entries.first().map(|(v, _)| v.len()).unwrap_or(0);
        if !entries.is_empty() && dims == 0 {
            return Err(RagError::InvalidInput(
                "index vectors must have at least one dimension".to_string(),
            ));
        }

        let mut stored = Vec::with_capacity(entries.len());
        let mut norms = Vec::with_capacity(entries.len());
        for (vector, chunk) in entries {
            if vector.len() != dims {
                return Err(RagError::DimensionMismatch {
                    expected: dims,
                    actual: vector.len(),
                });
            }
            norms.push(l2_norm(&vector));
            stored.push(IndexEntry { vector, chunk });
        }

        Ok(Self {
            dims,
            metric,
            embedding_model,
            created_at,
            entries: stored,
            norms,
        })
    }

    /// Return up to `k` entries ordered by decreasing similarity.
    ///
    /// Equal scores keep insertion order. Fails with
    /// [`RagError::EmptyIndex`] on an empty index and
    /// [`RagError::DimensionMismatch`] when the query length differs from
    /// the index dimensionality.
    pub fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        if self.entries.is_empty() {
            return Err(RagError::EmptyIndex);
        }
        if query.len() != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }

        let query_norm = l2_norm(query);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let score = self.score(query, query_norm, i, &entry.vector);
                // Non-finite scores (from inf/NaN components) rank last.
                (i, if score.is_finite() { score } else { f32::NEG_INFINITY })
            })
            .collect();

        // Stable sort: ties stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }

    fn score(&self, query: &[f32], query_norm: f32, i: usize, vector: &[f32]) -> f32 {
        match self.metric {
            Metric::Dot => dot(query, vector),
            Metric::Cosine => {
                let denom = query_norm * self.norms[i];
                if denom < f32::EPSILON {
                    0.0
                } else {
                    dot(query, vector) / denom
                }
            }
            Metric::Euclidean => {
                let dist = query
                    .iter()
                    .zip(vector)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>()
                    .sqrt();
                1.0 / (1.0 + dist)
            }
        }
    }

    /// Write the index to `dest` atomically.
    ///
    /// Parent directories are created as needed. The file is fully written
    /// and synced under a temporary name before being renamed over `dest`.
    pub fn persist(&self, dest: &Path) -> Result<()> {
        let dir = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let blob = self.vector_blob();
        let file = IndexFile {
            format_version: FORMAT_VERSION,
            metric: self.metric,
            dims: self.dims,
            embedding_model: self.embedding_model.clone(),
            created_at: self.created_at,
            checksum: checksum(&blob, &self.chunks())?,
            vectors: base64::engine::general_purpose::STANDARD.encode(&blob),
            chunks: self.chunks(),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, &file).map_err(std::io::Error::from)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(dest).map_err(|e| RagError::Io(e.error))?;

        tracing::info!(
            path = %dest.display(),
            entries = self.entries.len(),
            dims = self.dims,
            "index persisted"
        );
        Ok(())
    }

    /// Read an index previously written by [`persist`](Self::persist).
    pub fn load(source: &Path) -> Result<Self> {
        let bytes = std::fs::read(source).map_err(|e| RagError::IndexLoad {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;

        let file: IndexFile = serde_json::from_slice(&bytes)
            .map_err(|e| RagError::CorruptIndex(format!("unreadable index data: {}", e)))?;

        if file.format_version != FORMAT_VERSION {
            return Err(RagError::CorruptIndex(format!(
                "unsupported format version {}",
                file.format_version
            )));
        }

        let blob = base64::engine::general_purpose::STANDARD
            .decode(file.vectors.as_bytes())
            .map_err(|e| RagError::CorruptIndex(format!("vector data is not base64: {}", e)))?;
        if blob.len() % 4 != 0 {
            return Err(RagError::CorruptIndex(
                "vector data is not a whole number of f32 values".to_string(),
            ));
        }
        let floats = blob_to_vec(&blob);

        let vector_count = match file.dims {
            0 if floats.is_empty() => 0,
            0 => {
                return Err(RagError::CorruptIndex(
                    "zero dimensionality with non-empty vector data".to_string(),
                ))
            }
            d if floats.len() % d != 0 => {
                return Err(RagError::CorruptIndex(format!(
                    "vector data length {} is not a multiple of dims {}",
                    floats.len(),
                    d
                )))
            }
            d => floats.len() / d,
        };
        if vector_count != file.chunks.len() {
            return Err(RagError::CorruptIndex(format!(
                "metadata count {} does not match vector count {}",
                file.chunks.len(),
                vector_count
            )));
        }

        if checksum(&blob, &file.chunks)? != file.checksum {
            return Err(RagError::CorruptIndex("checksum mismatch".to_string()));
        }

        let entries: Vec<(Vec<f32>, Chunk)> = if file.dims == 0 {
            Vec::new()
        } else {
            floats
                .chunks_exact(file.dims)
                .map(|v| v.to_vec())
                .zip(file.chunks)
                .collect()
        };

        let index = Self::assemble(entries, file.metric, file.embedding_model, file.created_at)?;
        tracing::info!(
            path = %source.display(),
            entries = index.len(),
            dims = index.dims(),
            "index loaded"
        );
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimensionality; 0 for an empty index.
    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Name of the model whose vectors this index holds.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of distinct documents (pages) represented.
    pub fn document_count(&self) -> usize {
        let mut ids: Vec<&str> = self
            .entries
            .iter()
            .map(|e| e.chunk.document_id.as_str())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    fn chunks(&self) -> Vec<Chunk> {
        self.entries.iter().map(|e| e.chunk.clone()).collect()
    }

    fn vector_blob(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.entries.len() * self.dims * 4);
        for entry in &self.entries {
            bytes.extend(vec_to_blob(&entry.vector));
        }
        bytes
    }
}

fn checksum(blob: &[u8], chunks: &[Chunk]) -> Result<String> {
    let meta = serde_json::to_vec(chunks).map_err(std::io::Error::from)?;
    let mut hasher = Sha256::new();
    hasher.update(blob);
    hasher.update(&meta);
    Ok(format!("{:x}", hasher.finalize()))
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Encode a float vector as little-endian `f32` bytes.
///
/// ```rust
/// use lorekeeper::index::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian `f32` bytes. Trailing bytes short of 4 are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
