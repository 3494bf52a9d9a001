use serde::{Deserialize, Serialize};

use crate::chunker::ChunkerConfig;

/// Top-level index configuration, read from TOML.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub chunker: ChunkerConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

pub(crate) fn default_sqlite_path() -> String {
    ".ferret/index.db".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
        }
    }
}

/// Embeddings backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    OpenAi,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Chunks per provider request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Requests in flight per file.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl std::fmt::Debug for EmbeddingsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingsConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("batch_size", &self.batch_size)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

fn default_batch_size() -> usize {
    32
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: default_base_url(),
            model: default_embedding_model(),
            api_key: None,
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IndexerConfig {
    /// Larger files are reported as failed and not indexed.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Lines per full-text segment.
    #[serde(default = "default_fts_segment_lines")]
    pub fts_segment_lines: usize,
    /// Quiet period before the watcher reindexes changed files.
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
}

fn default_max_file_size() -> u64 {
    1024 * 1024
}

fn default_fts_segment_lines() -> usize {
    20
}

fn default_watch_debounce_ms() -> u64 {
    500
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            fts_segment_lines: default_fts_segment_lines(),
            watch_debounce_ms: default_watch_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Candidates asked from each source.
    #[serde(default = "default_n_retrieve")]
    pub n_retrieve: usize,
    /// Results returned after merging.
    #[serde(default = "default_n_final")]
    pub n_final: usize,
}

fn default_n_retrieve() -> usize {
    25
}

fn default_n_final() -> usize {
    10
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            n_retrieve: default_n_retrieve(),
            n_final: default_n_final(),
        }
    }
}
