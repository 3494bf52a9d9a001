use std::sync::Arc;

use ferret_llm::EmbeddingsProvider;

use super::merge::{MaxScoreNormalizer, ScoreNormalizer, merge};
use super::{RetrievalPipeline, RetrievalQuery, RetrievalResult};
use crate::artifact::{ArtifactKind, EmbeddingsIndex, FullTextIndex};
use crate::config::RetrievalConfig;
use crate::error::{IndexError, Result};
use crate::store::IndexStore;

/// Full-text and embedding sources merged on their own scores, with no
/// second-stage rescoring.
#[derive(Debug)]
pub struct NoRerankerPipeline<P> {
    store: IndexStore,
    provider: Arc<P>,
    n_retrieve: usize,
    n_final: usize,
    normalizer: Box<dyn ScoreNormalizer>,
}

impl<P: EmbeddingsProvider> NoRerankerPipeline<P> {
    /// # Errors
    ///
    /// Returns [`IndexError::Configuration`] if `n_final` is zero or larger
    /// than `n_retrieve`.
    pub fn new(store: IndexStore, provider: Arc<P>, config: &RetrievalConfig) -> Result<Self> {
        if config.n_final == 0 {
            return Err(IndexError::Configuration("n_final must be positive".into()));
        }
        if config.n_final > config.n_retrieve {
            return Err(IndexError::Configuration(format!(
                "n_final ({}) exceeds n_retrieve ({})",
                config.n_final, config.n_retrieve
            )));
        }
        Ok(Self {
            store,
            provider,
            n_retrieve: config.n_retrieve,
            n_final: config.n_final,
            normalizer: Box::new(MaxScoreNormalizer),
        })
    }

    #[must_use]
    pub fn with_normalizer(mut self, normalizer: impl ScoreNormalizer + 'static) -> Self {
        self.normalizer = Box::new(normalizer);
        self
    }
}

fn or_empty(kind: ArtifactKind, result: Result<Vec<RetrievalResult>>) -> Vec<RetrievalResult> {
    result.unwrap_or_else(|e| {
        tracing::warn!(source = %kind, "retrieval source failed: {e}");
        Vec::new()
    })
}

impl<P: EmbeddingsProvider> RetrievalPipeline for NoRerankerPipeline<P> {
    async fn run(&self, query: &RetrievalQuery) -> Vec<RetrievalResult> {
        let filter = query.filter_directory.as_deref();
        let fts_tags = query.tags_for(ArtifactKind::FullText);
        let embedding_tags = query.tags_for(ArtifactKind::Embeddings);

        let (fts, embeddings) = futures::join!(
            FullTextIndex::retrieve(
                self.store.pool(),
                &fts_tags,
                filter,
                &query.text,
                self.n_retrieve
            ),
            EmbeddingsIndex::retrieve(
                self.provider.as_ref(),
                self.store.pool(),
                &embedding_tags,
                filter,
                &query.text,
                self.n_retrieve
            )
        );

        let sources = vec![
            or_empty(ArtifactKind::FullText, fts),
            or_empty(ArtifactKind::Embeddings, embeddings),
        ];
        let results = merge(sources, self.normalizer.as_ref(), self.n_final);
        tracing::debug!(
            tags = query.tags.len(),
            results = results.len(),
            "retrieval finished"
        );
        results
    }
}
