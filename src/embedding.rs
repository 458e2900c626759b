//! Embedding capability and provider implementations.
//!
//! The pipeline only ever sees the [`Embedder`] trait: text in, fixed-length
//! vectors out. Providers:
//!
//! - **[`HttpEmbedder`]** with [`ApiFlavor::HuggingFace`]: the Hugging Face
//!   inference feature-extraction pipeline (sentence-transformers models).
//! - **[`HttpEmbedder`]** with [`ApiFlavor::OpenAI`]: `POST /v1/embeddings`.
//! - **[`HashingEmbedder`]**: deterministic offline feature hashing. No
//!   network, no model download; useful for tests and air-gapped runs.
//!
//! Use [`create_embedder`] to pick one from configuration.
//!
//! # Retry Strategy
//!
//! Remote providers retry transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (including model cold-start 503) → retry
//! - HTTP 401/403 → [`RagError::UpstreamAuth`], no retry
//! - other HTTP 4xx → fail immediately
//! - request timeout → [`RagError::EmbeddingTimeout`], no retry
//! - other network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

/// Maps text to dense vectors of a fixed dimensionality.
///
/// Implementations must be deterministic for a given model: the same text
/// always yields the same vector, and every vector has [`dims`](Self::dims)
/// components.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"sentence-transformers/all-MiniLM-L12-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding(self.model_name(), "empty embedding response"))
    }
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"huggingface"` | [`HttpEmbedder`] (Hugging Face inference) |
/// | `"openai"` | [`HttpEmbedder`] (OpenAI embeddings) |
/// | `"hashing"` | [`HashingEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "huggingface" => Ok(Arc::new(HttpEmbedder::new(ApiFlavor::HuggingFace, config)?)),
        "openai" => Ok(Arc::new(HttpEmbedder::new(ApiFlavor::OpenAI, config)?)),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dims))),
        other => Err(RagError::InvalidInput(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Remote providers ============

/// Wire protocol spoken by an [`HttpEmbedder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    HuggingFace,
    OpenAI,
}

impl ApiFlavor {
    fn label(self) -> &'static str {
        match self {
            ApiFlavor::HuggingFace => "huggingface",
            ApiFlavor::OpenAI => "openai",
        }
    }

    fn default_url(self, model: &str) -> String {
        match self {
            ApiFlavor::HuggingFace => format!(
                "https://router.huggingface.co/hf-inference/models/{}/pipeline/feature-extraction",
                model
            ),
            ApiFlavor::OpenAI => "https://api.openai.com/v1/embeddings".to_string(),
        }
    }
}

/// Embedder backed by a hosted HTTP API.
///
/// The API key is read from the environment variable named by
/// `embedding.api_key_env` on every call, so a key rotated in the
/// environment is picked up without a restart.
pub struct HttpEmbedder {
    flavor: ApiFlavor,
    model: String,
    dims: usize,
    url: String,
    api_key_env: String,
    max_retries: u32,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(flavor: ApiFlavor, config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::embedding(flavor.label(), e.to_string()))?;

        Ok(Self {
            flavor,
            model: config.model.clone(),
            dims: config.dims,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| flavor.default_url(&config.model)),
            api_key_env: config.api_key_env.clone(),
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
            client,
        })
    }

    fn request_body(&self, texts: &[String]) -> serde_json::Value {
        match self.flavor {
            ApiFlavor::HuggingFace => serde_json::json!({ "inputs": texts }),
            ApiFlavor::OpenAI => serde_json::json!({
                "model": self.model,
                "input": texts,
            }),
        }
    }

    fn parse_response(&self, json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
        match self.flavor {
            ApiFlavor::HuggingFace => parse_feature_extraction(json),
            ApiFlavor::OpenAI => parse_openai_response(json),
        }
        .map_err(|msg| RagError::embedding(self.flavor.label(), msg))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let api_key = std::env::var(&self.api_key_env).map_err(|_| {
            RagError::UpstreamAuth(format!(
                "API token not found: set the {} environment variable",
                self.api_key_env
            ))
        })?;

        let body = self.request_body(texts);
        let label = self.flavor.label();
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, delay_secs = delay.as_secs(), "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.url)
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            if e.is_timeout() {
                                RagError::EmbeddingTimeout(self.timeout_secs)
                            } else {
                                RagError::embedding(label, e.to_string())
                            }
                        })?;
                        let vectors = self.parse_response(&json)?;
                        return check_shape(label, vectors, texts.len(), self.dims);
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    if status.as_u16() == 401 || status.as_u16() == 403 {
                        return Err(RagError::UpstreamAuth(format!(
                            "embedding API rejected credential ({}): {}",
                            status, body_text
                        )));
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(%status, attempt, "transient embedding API error");
                        last_err = Some(RagError::embedding(
                            label,
                            format!("API error {}: {}", status, body_text),
                        ));
                        continue;
                    }

                    return Err(RagError::embedding(
                        label,
                        format!("API error {}: {}", status, body_text),
                    ));
                }
                Err(e) if e.is_timeout() => {
                    return Err(RagError::EmbeddingTimeout(self.timeout_secs));
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "embedding request failed");
                    last_err = Some(RagError::embedding(label, e.to_string()));
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| RagError::embedding(label, "embedding failed after retries")))
    }
}

/// Verify one vector per input, each of the configured length.
fn check_shape(
    provider: &str,
    vectors: Vec<Vec<f32>>,
    expected_count: usize,
    dims: usize,
) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected_count {
        return Err(RagError::embedding(
            provider,
            format!(
                "expected {} vectors, received {}",
                expected_count,
                vectors.len()
            ),
        ));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(RagError::DimensionMismatch {
            expected: dims,
            actual: bad.len(),
        });
    }
    Ok(vectors)
}

/// Parse a feature-extraction response: `[[f32, ...], ...]`.
fn parse_feature_extraction(json: &serde_json::Value) -> std::result::Result<Vec<Vec<f32>>, String> {
    let rows = json
        .as_array()
        .ok_or_else(|| "invalid response: expected an array of vectors".to_string())?;

    rows.iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| "invalid response: expected a vector".to_string())?
                .iter()
                .map(|v| {
                    v.as_f64()
                        .map(|f| f as f32)
                        .ok_or_else(|| {
                            "invalid response: non-numeric component (token-level output is not supported)"
                                .to_string()
                        })
                })
                .collect::<std::result::Result<Vec<f32>, String>>()
        })
        .collect()
}

/// Parse an OpenAI embeddings response, ordering rows by their `index`.
fn parse_openai_response(json: &serde_json::Value) -> std::result::Result<Vec<Vec<f32>>, String> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| "invalid response: missing data array".to_string())?;

    let mut rows: Vec<(u64, Vec<f32>)> = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| "invalid response: missing embedding".to_string())?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .unwrap_or(pos as u64);
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        rows.push((index, vec));
    }

    rows.sort_by_key(|(i, _)| *i);
    Ok(rows.into_iter().map(|(_, v)| v).collect())
}

// ============ Hashing Provider ============

/// Words too common to carry meaning in a bag-of-words vector.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "does", "for", "from", "how", "i",
    "in", "is", "it", "of", "on", "or", "the", "this", "to", "was", "what", "when", "where",
    "which", "who", "with", "you",
];

/// Deterministic feature-hashing embedder.
///
/// Each lowercase alphanumeric token (minus stop words) is hashed with
/// FNV-1a into one of `dims` buckets with a hash-derived sign, and the result
/// is L2-normalised. Texts that share vocabulary land close together under
/// cosine similarity. This is a lexical model, not a semantic one.
pub struct HashingEmbedder {
    dims: usize,
    name: String,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            name: format!("hashing-{}", dims),
        }
    }

    /// Embed one text synchronously.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        if self.dims == 0 {
            return v;
        }
        let lowered = text.to_lowercase();
        let tokens = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty() && !STOP_WORDS.contains(t));
        for token in tokens {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.dims as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_hashing_is_deterministic_and_sized() {
        let e = HashingEmbedder::new(64);
        let texts = vec!["Safe code 2591".to_string(), "Safe code 2591".to_string()];
        let out = e.embed(&texts).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 64);
        assert_eq!(out[0], out[1]);
        let norm: f32 = out[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hashing_shared_vocabulary_is_closer() {
        let e = HashingEmbedder::new(384);
        let q = e.embed_query("What is the safe code?").await.unwrap();
        let hit = e.embed_one("The safe code in the pharmacy is 2591.");
        let miss = e.embed_one("Ellie can craft arrows at a workbench.");
        // Both sides are unit length, so the dot product is the cosine.
        assert!(dot(&q, &hit) > dot(&q, &miss));
    }

    #[test]
    fn test_hashing_empty_text_is_zero_vector() {
        let v = HashingEmbedder::new(8).embed_one("the of and");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_parse_feature_extraction() {
        let json = serde_json::json!([[0.1, 0.2], [0.3, 0.4]]);
        let out = parse_feature_extraction(&json).unwrap();
        assert_eq!(out, vec![vec![0.1f32, 0.2], vec![0.3, 0.4]]);

        let token_level = serde_json::json!([[[0.1, 0.2]]]);
        assert!(parse_feature_extraction(&token_level).is_err());
    }

    #[test]
    fn test_parse_openai_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [2.0, 2.0] },
                { "index": 0, "embedding": [1.0, 1.0] }
            ]
        });
        let out = parse_openai_response(&json).unwrap();
        assert_eq!(out, vec![vec![1.0f32, 1.0], vec![2.0, 2.0]]);
        assert!(parse_openai_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_check_shape() {
        assert!(check_shape("t", vec![vec![0.0; 3]], 1, 3).is_ok());
        assert!(matches!(
            check_shape("t", vec![vec![0.0; 3]], 2, 3),
            Err(RagError::Embedding { .. })
        ));
        assert!(matches!(
            check_shape("t", vec![vec![0.0; 4]], 1, 3),
            Err(RagError::DimensionMismatch {
                expected: 3,
                actual: 4
            })
        ));
    }

    #[tokio::test]
    async fn test_missing_credential_is_auth_error() {
        let config = EmbeddingConfig {
            api_key_env: "LOREKEEPER_TEST_UNSET_EMBED_KEY".to_string(),
            ..EmbeddingConfig::default()
        };
        let e = HttpEmbedder::new(ApiFlavor::HuggingFace, &config).unwrap();
        let err = e.embed(&["hello".to_string()]).await.unwrap_err();
        assert!(matches!(err, RagError::UpstreamAuth(_)));
    }

    #[test]
    fn test_default_urls() {
        let config = EmbeddingConfig::default();
        let hf = HttpEmbedder::new(ApiFlavor::HuggingFace, &config).unwrap();
        assert!(hf.url.ends_with("sentence-transformers/all-MiniLM-L12-v2/pipeline/feature-extraction"));
        let oa = HttpEmbedder::new(ApiFlavor::OpenAI, &config).unwrap();
        assert_eq!(oa.url, "https://api.openai.com/v1/embeddings");
    }
}
