mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::Context;
use ferret_llm::AnyProvider;
use ferret_llm::ollama::OllamaProvider;
use ferret_llm::openai::OpenAiProvider;

use crate::error::{IndexError, Result};

impl IndexConfig {
    /// Load configuration from a TOML file, apply `FERRET_*` environment
    /// overrides, then validate.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// the result is invalid.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`IndexError::Configuration`] naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(IndexError::Configuration(msg.to_owned()));

        if self.embeddings.batch_size == 0 {
            return invalid("embeddings.batch_size must be positive");
        }
        if self.embeddings.max_concurrency == 0 {
            return invalid("embeddings.max_concurrency must be positive");
        }
        if self.chunker.target_size == 0 || self.chunker.target_size > self.chunker.max_size {
            return invalid("chunker.target_size must be in 1..=max_size");
        }
        if self.chunker.min_size > self.chunker.target_size {
            return invalid("chunker.min_size must not exceed target_size");
        }
        if self.indexer.fts_segment_lines == 0 {
            return invalid("indexer.fts_segment_lines must be positive");
        }
        if self.indexer.max_file_size == 0 {
            return invalid("indexer.max_file_size must be positive");
        }
        if self.retrieval.n_final == 0 {
            return invalid("retrieval.n_final must be positive");
        }
        if self.retrieval.n_final > self.retrieval.n_retrieve {
            return invalid("retrieval.n_final must not exceed retrieval.n_retrieve");
        }
        Ok(())
    }

    /// Build the configured embeddings backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend client cannot be created.
    pub fn build_provider(&self) -> Result<AnyProvider> {
        let e = &self.embeddings;
        let provider = match e.provider {
            ProviderKind::Ollama => {
                AnyProvider::Ollama(OllamaProvider::new(&e.base_url, e.model.clone()))
            }
            ProviderKind::OpenAi => AnyProvider::OpenAi(OpenAiProvider::new(
                e.api_key.clone(),
                e.base_url.clone(),
                e.model.clone(),
            )?),
        };
        tracing::info!(
            provider = e.provider.as_str(),
            model = %e.model,
            "embeddings provider configured"
        );
        Ok(provider)
    }
}
