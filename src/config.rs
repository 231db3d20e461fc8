//! TOML configuration parsing and validation.
//!
//! Every section is optional; a missing file yields [`Config::default`].
//! See `config/pqa.example.toml` for a fully commented example.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{QaError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("./data/index")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RetrievalConfig {
    /// Minimum cosine similarity a candidate needs to be considered.
    #[serde(default)]
    pub similarity_floor: Option<f32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    #[serde(default = "default_window")]
    pub window: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
        }
    }
}

fn default_window() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IngestConfig {
    /// Drop chunks whose `(source, hash)` is already indexed.
    #[serde(default)]
    pub skip_duplicates: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CredentialsConfig {
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl CredentialsConfig {
    /// Read the API key from the configured environment variable.
    ///
    /// A missing or blank value is a configuration error, reported before
    /// any ingestion or query work starts.
    pub fn api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(QaError::Configuration(format!(
                "Please set the {} environment variable.",
                self.api_key_env
            ))),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_chat_model(),
            temperature: 0.0,
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}
fn default_generation_retries() -> u32 {
    3
}
fn default_generation_timeout() -> u64 {
    60
}

impl Config {
    /// Path of the SQLite file backing the persisted index.
    pub fn index_path(&self) -> PathBuf {
        self.index.dir.join(crate::index::sqlite::INDEX_FILE)
    }

    pub fn validate(&self) -> Result<()> {
        let bail = |msg: String| Err(QaError::Configuration(msg));

        if self.chunking.chunk_size == 0 {
            return bail("chunking.chunk_size must be > 0".into());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return bail(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            ));
        }
        if let Some(floor) = self.retrieval.similarity_floor {
            if !(-1.0..=1.0).contains(&floor) {
                return bail("retrieval.similarity_floor must be in [-1.0, 1.0]".into());
            }
        }
        if self.memory.window == 0 {
            return bail("memory.window must be > 0".into());
        }
        if self.embedding.dims == 0 {
            return bail("embedding.dims must be > 0".into());
        }
        if self.embedding.batch_size == 0 {
            return bail("embedding.batch_size must be > 0".into());
        }
        if self.embedding.model.trim().is_empty() || self.generation.model.trim().is_empty() {
            return bail("embedding.model and generation.model must be set".into());
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return bail("generation.temperature must be in [0.0, 2.0]".into());
        }
        if self.credentials.api_key_env.trim().is_empty() {
            return bail("credentials.api_key_env must name an environment variable".into());
        }
        Ok(())
    }
}

/// Load and validate a configuration file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| {
            QaError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        parse_config(&content)?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content)
        .map_err(|e| QaError::Configuration(format!("Failed to parse config file: {}", e)))
}
