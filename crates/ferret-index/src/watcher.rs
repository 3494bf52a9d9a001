//! Debounced filesystem watching that feeds changed files into
//! [`CodebaseIndexer::refresh_files`].

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ferret_llm::EmbeddingsProvider;
use notify_debouncer_mini::{DebouncedEvent, DebouncedEventKind, new_debouncer};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::indexer::CodebaseIndexer;
use crate::languages::is_indexable;
use crate::progress::RefreshSummary;

pub struct IndexWatcher {
    handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

impl IndexWatcher {
    /// Watch every workspace directory of `indexer` and reindex files once
    /// they have been quiet for `debounce`.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be initialized or a
    /// directory cannot be watched.
    pub fn start<P: EmbeddingsProvider + 'static>(
        dirs: &[PathBuf],
        indexer: Arc<CodebaseIndexer<P>>,
        debounce: Duration,
    ) -> Result<Self> {
        let (notify_tx, mut notify_rx) = mpsc::channel::<Vec<PathBuf>>(64);

        let mut debouncer = new_debouncer(
            debounce,
            move |events: std::result::Result<Vec<DebouncedEvent>, notify::Error>| {
                let events = match events {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::warn!("index watcher error: {e}");
                        return;
                    }
                };
                let paths = changed_paths(events);
                if !paths.is_empty() {
                    let _ = notify_tx.blocking_send(paths);
                }
            },
        )?;

        for dir in dirs {
            debouncer
                .watcher()
                .watch(dir, notify::RecursiveMode::Recursive)?;
        }

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let _debouncer = debouncer;
            loop {
                let paths = tokio::select! {
                    () = task_cancel.cancelled() => break,
                    paths = notify_rx.recv() => match paths {
                        Some(paths) => paths,
                        None => break,
                    },
                };

                let files = paths.len();
                let stream = indexer.refresh_files(paths, task_cancel.child_token());
                let summary = RefreshSummary::collect(stream).await;
                tracing::info!(
                    files,
                    indexed = summary.indexed(),
                    failed = summary.failed,
                    "watcher refresh finished"
                );
            }
        });

        Ok(Self { handle, cancel })
    }

    /// Stop watching; an in-flight refresh is cancelled between files.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for IndexWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

fn changed_paths(events: Vec<DebouncedEvent>) -> Vec<PathBuf> {
    events
        .into_iter()
        .filter(|e| e.kind == DebouncedEventKind::Any && is_indexable(&e.path))
        .map(|e| e.path)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use ferret_llm::mock::MockProvider;

    use super::*;
    use crate::config::IndexConfig;
    use crate::pause::PauseToken;
    use crate::store::IndexStore;
    use crate::workspace::FsWorkspace;

    async fn create_test_indexer(dir: &Path) -> Arc<CodebaseIndexer<MockProvider>> {
        let store = IndexStore::open(":memory:").await.unwrap();
        Arc::new(CodebaseIndexer::new(
            Arc::new(FsWorkspace::new(vec![dir.to_path_buf()])),
            store,
            Arc::new(MockProvider::default()),
            PauseToken::default(),
            &IndexConfig::default(),
        ))
    }

    fn event(path: &str, kind: DebouncedEventKind) -> DebouncedEvent {
        DebouncedEvent {
            path: PathBuf::from(path),
            kind,
        }
    }

    #[test]
    fn changed_paths_filters_and_dedupes() {
        let paths = changed_paths(vec![
            event("/repo/b.rs", DebouncedEventKind::Any),
            event("/repo/a.rs", DebouncedEventKind::Any),
            event("/repo/b.rs", DebouncedEventKind::Any),
            event("/repo/image.png", DebouncedEventKind::Any),
            event("/repo/c.rs", DebouncedEventKind::AnyContinuous),
        ]);
        assert_eq!(paths, vec![PathBuf::from("/repo/a.rs"), PathBuf::from("/repo/b.rs")]);
    }

    #[tokio::test]
    async fn start_with_valid_directory() {
        let dir = tempfile::tempdir().unwrap();
        let indexer = create_test_indexer(dir.path()).await;
        let watcher = IndexWatcher::start(
            &[dir.path().to_path_buf()],
            indexer,
            Duration::from_millis(100),
        );
        assert!(watcher.is_ok());
        watcher.unwrap().stop();
    }

    #[tokio::test]
    async fn refresh_stream_runs_on_spawned_task() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.py");
        std::fs::write(&path, "def spawned():\n    return 1\n").unwrap();
        let indexer = create_test_indexer(dir.path()).await;

        let task_indexer = Arc::clone(&indexer);
        let summary = tokio::spawn(async move {
            RefreshSummary::collect(task_indexer.refresh_files(vec![path], CancellationToken::new()))
                .await
        })
        .await
        .unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(summary.failed, 0);
        assert!(summary.done);
    }

    #[tokio::test]
    async fn start_with_nonexistent_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let indexer = create_test_indexer(dir.path()).await;
        let result = IndexWatcher::start(
            &[PathBuf::from("/nonexistent/path/xyz")],
            indexer,
            Duration::from_millis(100),
        );
        assert!(result.is_err());
    }
}
