//! Progress items yielded by a refresh.

use std::path::PathBuf;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::diff::DiffKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    Loading,
    Indexing,
    Paused,
    Done,
    Failed,
}

/// One step of a refresh. The last item is always `Done` or `Failed`; a
/// `Failed` item that carries a `file_path` and is not cancelled reports a
/// single file and the refresh goes on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshProgress {
    pub status: RefreshStatus,
    /// Fraction of changed files processed, in `[0, 1]`.
    pub progress: f32,
    pub description: String,
    pub file_path: Option<PathBuf>,
    pub diff: Option<DiffKind>,
    pub cancelled: bool,
}

impl RefreshProgress {
    fn new(status: RefreshStatus, progress: f32, description: impl Into<String>) -> Self {
        Self {
            status,
            progress: progress.clamp(0.0, 1.0),
            description: description.into(),
            file_path: None,
            diff: None,
            cancelled: false,
        }
    }

    #[must_use]
    pub fn loading(description: impl Into<String>) -> Self {
        Self::new(RefreshStatus::Loading, 0.0, description)
    }

    #[must_use]
    pub fn indexed(progress: f32, path: PathBuf, diff: DiffKind) -> Self {
        let description = format!("{diff} {}", path.display());
        Self {
            file_path: Some(path),
            diff: Some(diff),
            ..Self::new(RefreshStatus::Indexing, progress, description)
        }
    }

    #[must_use]
    pub fn paused(progress: f32) -> Self {
        Self::new(RefreshStatus::Paused, progress, "indexing paused")
    }

    #[must_use]
    pub fn done(description: impl Into<String>) -> Self {
        Self::new(RefreshStatus::Done, 1.0, description)
    }

    /// A single file failed; the refresh continues.
    #[must_use]
    pub fn file_failed(progress: f32, path: PathBuf, diff: Option<DiffKind>, error: &str) -> Self {
        let description = format!("failed to index {}: {error}", path.display());
        Self {
            file_path: Some(path),
            diff,
            ..Self::new(RefreshStatus::Failed, progress, description)
        }
    }

    #[must_use]
    pub fn cancelled(progress: f32) -> Self {
        Self {
            cancelled: true,
            ..Self::new(RefreshStatus::Failed, progress, "indexing cancelled")
        }
    }

    /// Whether this item ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self.status {
            RefreshStatus::Done => true,
            RefreshStatus::Failed => self.cancelled || self.file_path.is_none(),
            _ => false,
        }
    }
}

/// Counts folded from a progress stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub failed: usize,
    pub paused: usize,
    pub cancelled: bool,
    pub done: bool,
}

impl RefreshSummary {
    pub fn record(&mut self, item: &RefreshProgress) {
        match item.status {
            RefreshStatus::Indexing => match item.diff {
                Some(DiffKind::Added) => self.added += 1,
                Some(DiffKind::Updated) => self.updated += 1,
                Some(DiffKind::Removed) => self.removed += 1,
                Some(DiffKind::Unchanged) | None => {}
            },
            RefreshStatus::Paused => self.paused += 1,
            RefreshStatus::Failed if item.cancelled => self.cancelled = true,
            RefreshStatus::Failed => self.failed += 1,
            RefreshStatus::Done => self.done = true,
            RefreshStatus::Loading => {}
        }
    }

    /// Files that went through every artifact.
    #[must_use]
    pub fn indexed(&self) -> usize {
        self.added + self.updated + self.removed
    }

    /// Drain `stream` into a summary.
    pub async fn collect<S>(stream: S) -> Self
    where
        S: Stream<Item = RefreshProgress>,
    {
        let mut summary = Self::default();
        futures::pin_mut!(stream);
        while let Some(item) = stream.next().await {
            summary.record(&item);
        }
        summary
    }
}
