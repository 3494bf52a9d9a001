//! Ranked retrieval over the indexed artifacts.

mod merge;
mod no_reranker;

use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;

use serde::Serialize;

pub use merge::{MaxScoreNormalizer, ScoreNormalizer, merge};
pub use no_reranker::NoRerankerPipeline;

use crate::artifact::ArtifactKind;
use crate::tag::Tag;

/// A ranked snippet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub filepath: String,
    pub content: String,
    /// Source-specific until merged; normalized afterwards.
    pub score: f32,
    /// 1-based, inclusive.
    pub start_line: usize,
    pub end_line: usize,
    pub source: ArtifactKind,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalQuery {
    /// Scopes to search. Only branch and directory matter; each source binds
    /// them to its own artifact.
    pub tags: BTreeSet<Tag>,
    pub filter_directory: Option<PathBuf>,
    pub text: String,
}

impl RetrievalQuery {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }

    #[must_use]
    pub fn with_filter_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.filter_directory = Some(dir.into());
        self
    }

    /// The requested scopes bound to `kind`.
    #[must_use]
    pub fn tags_for(&self, kind: ArtifactKind) -> Vec<Tag> {
        self.tags
            .iter()
            .map(|t| t.with_artifact(kind.id()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Turns a query into a final, ordered result list.
pub trait RetrievalPipeline: Send + Sync {
    /// Never fails: a source that errors contributes no results.
    fn run(&self, query: &RetrievalQuery) -> impl Future<Output = Vec<RetrievalResult>> + Send;
}
