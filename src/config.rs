//! TOML configuration parsing and validation.
//!
//! All settings live in one file (default `./config/lore.toml`). A handful of
//! keys may be overridden from the environment so a deployment can be tuned
//! without editing the file:
//!
//! | Variable | Key |
//! |----------|-----|
//! | `LORE_INDEX_PATH` | `index.path` |
//! | `LORE_EMBEDDING_MODEL` | `embedding.model` |
//! | `LORE_GENERATION_MODEL` | `generation.model` |
//! | `LORE_TEMPERATURE` | `generation.temperature` |
//! | `LORE_CHUNK_SIZE` | `chunking.chunk_size` |
//! | `LORE_CHUNK_OVERLAP` | `chunking.overlap` |
//! | `LORE_RETRIEVAL_K` | `retrieval.k` |
//!
//! Credentials are never stored in the file. Each provider names the
//! environment variable holding its key (`api_key_env`), read at call time.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::index::Metric;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub documents: DocumentsConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub metric: Metric,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn default_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Overrides the provider's endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            url: None,
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "huggingface".to_string()
}
fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L12-v2".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_api_key_env() -> String {
    "HF_TOKEN".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Overrides the provider's chat-completions base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            base_url: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_generation_provider() -> String {
    "huggingface".to_string()
}
fn default_generation_model() -> String {
    "mistralai/Mistral-7B-Instruct-v0.3".to_string()
}
fn default_temperature() -> f32 {
    0.5
}
fn default_max_tokens() -> u32 {
    512
}
fn default_generation_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PromptConfig {
    /// Replaces the built-in template. Must contain `{context}` and `{question}`.
    #[serde(default)]
    pub template: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    /// Per-target overrides, e.g. `lorekeeper::qa = "debug"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Read, override from the environment, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content, |key| std::env::var(key).ok())
}

/// Parse config text, applying overrides from `env` before validation.
///
/// Split from [`load_config`] so tests can supply their own environment.
pub fn parse_config<F>(content: &str, env: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    apply_env_overrides(&mut config, env)?;
    validate(&config)?;
    Ok(config)
}

fn apply_env_overrides<F>(config: &mut Config, env: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = env("LORE_INDEX_PATH") {
        config.index.path = PathBuf::from(v);
    }
    if let Some(v) = env("LORE_EMBEDDING_MODEL") {
        config.embedding.model = v;
    }
    if let Some(v) = env("LORE_GENERATION_MODEL") {
        config.generation.model = v;
    }
    if let Some(v) = env("LORE_TEMPERATURE") {
        config.generation.temperature = v
            .parse()
            .with_context(|| format!("LORE_TEMPERATURE is not a number: '{}'", v))?;
    }
    if let Some(v) = env("LORE_CHUNK_SIZE") {
        config.chunking.chunk_size = v
            .parse()
            .with_context(|| format!("LORE_CHUNK_SIZE is not an integer: '{}'", v))?;
    }
    if let Some(v) = env("LORE_CHUNK_OVERLAP") {
        config.chunking.overlap = v
            .parse()
            .with_context(|| format!("LORE_CHUNK_OVERLAP is not an integer: '{}'", v))?;
    }
    if let Some(v) = env("LORE_RETRIEVAL_K") {
        config.retrieval.k = v
            .parse()
            .with_context(|| format!("LORE_RETRIEVAL_K is not an integer: '{}'", v))?;
    }
    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    let c = &config.chunking;
    if c.overlap == 0 || c.overlap >= c.chunk_size {
        bail!(
            "chunking.overlap must satisfy 0 < overlap < chunk_size (got overlap={}, chunk_size={})",
            c.overlap,
            c.chunk_size
        );
    }

    // Validate retrieval
    if config.retrieval.k < 1 {
        bail!("retrieval.k must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "huggingface" | "openai" | "hashing" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be huggingface, openai, or hashing.",
            other
        ),
    }
    if config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "huggingface" | "openai" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be huggingface or openai.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}
