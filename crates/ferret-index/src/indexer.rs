//! Refresh orchestration: enumerate → diff → update every artifact per file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use ferret_llm::EmbeddingsProvider;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::artifact::{
    Artifact, ArtifactKind, ChunkIndex, EmbeddingsIndex, FileEntry, FullTextIndex, MetadataIndex,
    hash_bytes,
};
use crate::config::IndexConfig;
use crate::diff::{DiffKind, compute_diff};
use crate::error::{IndexError, Result};
use crate::pause::PauseToken;
use crate::progress::RefreshProgress;
use crate::store::IndexStore;
use crate::tag::{BranchAndDir, Tag};
use crate::workspace::WorkspaceReader;

/// Progress of one refresh call.
pub type RefreshStream<'a> = Pin<Box<dyn Stream<Item = RefreshProgress> + Send + 'a>>;

/// One file queued for indexing.
#[derive(Debug, Clone)]
struct WorkItem {
    scope: BranchAndDir,
    path: PathBuf,
    kind: DiffKind,
    /// Last recorded hash, used for removed files.
    content_hash: String,
}

/// A file rejected before any artifact ran.
#[derive(Debug)]
struct Rejected {
    path: PathBuf,
    reason: String,
}

/// Keeps every artifact of a workspace in step with its files.
///
/// Each file is indexed in one transaction covering all artifacts and the
/// catalog, so readers see either the old or the new state of a file.
pub struct CodebaseIndexer<P> {
    workspace: Arc<dyn WorkspaceReader>,
    store: IndexStore,
    artifacts: Vec<Artifact<P>>,
    pause: PauseToken,
    max_file_size: u64,
}

impl<P: EmbeddingsProvider> CodebaseIndexer<P> {
    #[must_use]
    pub fn new(
        workspace: Arc<dyn WorkspaceReader>,
        store: IndexStore,
        provider: Arc<P>,
        pause: PauseToken,
        config: &IndexConfig,
    ) -> Self {
        let artifacts = ArtifactKind::ORDER
            .into_iter()
            .map(|kind| match kind {
                ArtifactKind::Metadata => Artifact::Metadata(MetadataIndex),
                ArtifactKind::FullText => {
                    Artifact::FullText(FullTextIndex::new(config.indexer.fts_segment_lines))
                }
                ArtifactKind::Chunk => Artifact::Chunk(ChunkIndex::new(config.chunker.clone())),
                ArtifactKind::Embeddings => Artifact::Embeddings(EmbeddingsIndex::new(
                    Arc::clone(&provider),
                    config.chunker.clone(),
                    config.embeddings.batch_size,
                    config.embeddings.max_concurrency,
                )),
            })
            .collect();

        Self {
            workspace,
            store,
            artifacts,
            pause,
            max_file_size: config.indexer.max_file_size,
        }
    }

    #[must_use]
    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    #[must_use]
    pub fn pause_token(&self) -> &PauseToken {
        &self.pause
    }

    /// Every (workspace directory × artifact) tag this indexer writes.
    pub async fn tags(&self) -> Vec<Tag> {
        let mut tags = Vec::new();
        for artifact in &self.artifacts {
            tags.extend(self.workspace.get_tags(artifact.kind().id()).await);
        }
        tags
    }

    /// Refresh every workspace directory.
    ///
    /// # Errors
    ///
    /// See [`CodebaseIndexer::refresh_dirs`].
    pub async fn refresh_workspace(
        &self,
        cancel: CancellationToken,
    ) -> Result<RefreshStream<'_>> {
        self.refresh_dirs(self.workspace.workspace_dirs(), cancel).await
    }

    /// Diff `dirs` against the catalog and index whatever changed.
    ///
    /// Enumeration and diffing happen before this returns; indexing happens
    /// as the stream is polled, one file at a time.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Enumeration`] if a directory cannot be listed,
    /// or a database error if the catalog cannot be read.
    pub async fn refresh_dirs(
        &self,
        dirs: Vec<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<RefreshStream<'_>> {
        let mut work = Vec::new();
        let mut rejected = Vec::new();

        for dir in &dirs {
            let listed = self.workspace.list_files(dir).await?;
            let scope = BranchAndDir {
                branch: self.workspace.branch(dir).await,
                directory: dir.clone(),
            };
            let tags: Vec<Tag> = self
                .artifacts
                .iter()
                .map(|a| scope.tag(a.kind().id()))
                .collect();

            let mut hashes = HashMap::with_capacity(listed.len());
            for path in &listed {
                match self.read_bounded(path).await {
                    Ok(bytes) => {
                        hashes.insert(path.clone(), hash_bytes(&bytes));
                    }
                    Err(e) => rejected.push(Rejected {
                        path: path.clone(),
                        reason: e.to_string(),
                    }),
                }
            }

            let diffs = compute_diff(&self.store, &tags, &listed, &hashes).await?;
            tracing::info!(
                dir = %dir.display(),
                branch = %scope.branch,
                files = listed.len(),
                changed = diffs.len(),
                "refresh planned"
            );
            work.extend(diffs.into_iter().map(|d| WorkItem {
                scope: scope.clone(),
                path: d.path,
                kind: d.kind,
                content_hash: d.content_hash,
            }));
        }

        Ok(self.process(work, rejected, cancel))
    }

    /// Reindex specific files without diffing. Existing files are treated as
    /// updated, missing ones as removed; paths outside every workspace
    /// directory are reported as failed.
    pub fn refresh_files(
        &self,
        paths: Vec<PathBuf>,
        cancel: CancellationToken,
    ) -> RefreshStream<'_> {
        Box::pin(stream! {
            let dirs = self.workspace.workspace_dirs();
            let mut work = Vec::new();
            let mut rejected = Vec::new();

            for path in paths {
                let Some(dir) = owning_dir(&dirs, &path) else {
                    rejected.push(Rejected {
                        reason: "not inside any workspace directory".into(),
                        path,
                    });
                    continue;
                };
                let scope = BranchAndDir {
                    branch: self.workspace.branch(dir).await,
                    directory: dir.to_path_buf(),
                };
                let kind = match self.workspace.read_file(&path).await {
                    Err(IndexError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                        DiffKind::Removed
                    }
                    _ => DiffKind::Updated,
                };
                work.push(WorkItem {
                    scope,
                    path,
                    kind,
                    content_hash: String::new(),
                });
            }

            let mut inner = self.process(work, rejected, cancel);
            while let Some(item) = inner.next().await {
                yield item;
            }
        })
    }

    fn process(
        &self,
        work: Vec<WorkItem>,
        rejected: Vec<Rejected>,
        cancel: CancellationToken,
    ) -> RefreshStream<'_> {
        Box::pin(stream! {
            let total = work.len() + rejected.len();
            let mut processed = 0usize;
            let mut failed = 0usize;
            let fraction = |done: usize| fraction(done, total);

            yield RefreshProgress::loading(format!("{} files to index", work.len()));

            for file in rejected {
                processed += 1;
                failed += 1;
                tracing::warn!(path = %file.path.display(), "skipped: {}", file.reason);
                yield RefreshProgress::file_failed(fraction(processed), file.path, None, &file.reason);
            }

            for item in work {
                if cancel.is_cancelled() {
                    yield RefreshProgress::cancelled(fraction(processed));
                    return;
                }

                if self.pause.is_paused() {
                    yield RefreshProgress::paused(fraction(processed));
                    let cancelled = tokio::select! {
                        () = self.pause.wait_until_running() => false,
                        () = cancel.cancelled() => true,
                    };
                    if cancelled {
                        yield RefreshProgress::cancelled(fraction(processed));
                        return;
                    }
                }

                let result = self.index_file(&item, &cancel).await;
                processed += 1;
                let progress = fraction(processed);

                match result {
                    Ok(0) => {
                        tracing::debug!(path = %item.path.display(), diff = %item.kind, "indexed");
                        yield RefreshProgress::indexed(progress, item.path, item.kind);
                    }
                    Ok(degraded) => {
                        failed += 1;
                        let reason = format!("{degraded} chunks could not be embedded; will retry");
                        tracing::warn!(path = %item.path.display(), "{reason}");
                        yield RefreshProgress::file_failed(progress, item.path, Some(item.kind), &reason);
                    }
                    Err(IndexError::Cancelled) => {
                        yield RefreshProgress::cancelled(fraction(processed - 1));
                        return;
                    }
                    Err(e) => {
                        failed += 1;
                        tracing::warn!(path = %item.path.display(), "indexing failed: {e}");
                        yield RefreshProgress::file_failed(progress, item.path, Some(item.kind), &e.to_string());
                    }
                }

                if cancel.is_cancelled() {
                    yield RefreshProgress::cancelled(progress);
                    return;
                }
            }

            tracing::info!(total, failed, "refresh finished");
            yield RefreshProgress::done(format!("indexed {} files, {failed} failed", total - failed));
        })
    }

    /// Apply every artifact to one file.
    ///
    /// Provider calls run first, outside any transaction; the rows and the
    /// catalog are then written in one short transaction. Returns the number
    /// of degraded records; when non-zero the writes are kept but the hash is
    /// not committed.
    async fn index_file(&self, item: &WorkItem, cancel: &CancellationToken) -> Result<usize> {
        let entry = if item.kind == DiffKind::Removed {
            FileEntry::removed(item.path.clone(), item.content_hash.clone())
        } else {
            let bytes = self.read_bounded(&item.path).await?;
            FileEntry::from_bytes(item.path.clone(), &bytes)
        };

        let mut prepared = Vec::with_capacity(self.artifacts.len());
        for artifact in &self.artifacts {
            let result = tokio::select! {
                result = artifact.prepare(&entry, item.kind) => result,
                () = cancel.cancelled() => return Err(IndexError::Cancelled),
            };
            prepared.push(result?);
        }

        let mut tx = self.store.begin().await?;
        let mut degraded = 0;

        for (artifact, prepared) in self.artifacts.iter().zip(prepared) {
            if cancel.is_cancelled() {
                tx.rollback().await?;
                return Err(IndexError::Cancelled);
            }
            let tag = item.scope.tag(artifact.kind().id());
            let outcome = artifact
                .update(&mut tx, &tag, &entry, item.kind, prepared)
                .await?;
            degraded += outcome.failed;
        }

        if cancel.is_cancelled() {
            tx.rollback().await?;
            return Err(IndexError::Cancelled);
        }

        if degraded == 0 {
            for artifact in &self.artifacts {
                let tag = item.scope.tag(artifact.kind().id());
                if item.kind == DiffKind::Removed {
                    IndexStore::forget(&mut tx, &tag, &entry.path).await?;
                } else {
                    IndexStore::commit_hash(&mut tx, &tag, &entry.path, &entry.content_hash).await?;
                }
            }
        }

        tx.commit().await?;
        Ok(degraded)
    }

    async fn read_bounded(&self, path: &Path) -> Result<Vec<u8>> {
        let bytes = self.workspace.read_file(path).await?;
        let size = u64::try_from(bytes.len())?;
        if size > self.max_file_size {
            return Err(IndexError::FileTooLarge {
                path: path.to_path_buf(),
                size,
                limit: self.max_file_size,
            });
        }
        Ok(bytes)
    }

    /// Drop every artifact row and catalog record under this indexer's tags.
    ///
    /// Must not run while a refresh is in progress.
    ///
    /// # Errors
    ///
    /// Returns an error if a delete fails; nothing is removed in that case.
    pub async fn clear_indexes(&self) -> Result<()> {
        let tags = self.tags().await;
        let mut tx = self.store.begin().await?;
        let mut rows = 0;
        for tag in &tags {
            if let Some(artifact) = self.artifacts.iter().find(|a| a.kind().id() == tag.artifact_id) {
                rows += artifact.clear(&mut tx, tag).await?;
            }
            IndexStore::forget_tag(&mut tx, tag).await?;
        }
        tx.commit().await?;
        tracing::info!(tags = tags.len(), rows, "indexes cleared");
        Ok(())
    }
}

#[allow(clippy::cast_precision_loss)]
fn fraction(done: usize, total: usize) -> f32 {
    if total == 0 {
        1.0
    } else {
        done as f32 / total as f32
    }
}

/// Deepest workspace directory containing `path`.
fn owning_dir<'a>(dirs: &'a [PathBuf], path: &Path) -> Option<&'a Path> {
    dirs.iter()
        .filter(|d| path.starts_with(d))
        .max_by_key(|d| d.components().count())
        .map(PathBuf::as_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_handles_empty_refresh() {
        assert!((fraction(0, 0) - 1.0).abs() < f32::EPSILON);
        assert!((fraction(1, 4) - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn owning_dir_prefers_deepest() {
        let dirs = vec![PathBuf::from("/repo"), PathBuf::from("/repo/sub")];
        assert_eq!(
            owning_dir(&dirs, Path::new("/repo/sub/a.rs")),
            Some(Path::new("/repo/sub"))
        );
        assert_eq!(owning_dir(&dirs, Path::new("/repo/a.rs")), Some(Path::new("/repo")));
        assert_eq!(owning_dir(&dirs, Path::new("/other/a.rs")), None);
        assert_eq!(owning_dir(&dirs, Path::new("/repository/a.rs")), None);
    }
}
