use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ferret_index::tag::NO_BRANCH;
use ferret_index::{
    CodebaseIndexer, DiffKind, FsWorkspace, IndexConfig, IndexError, IndexStore, PauseToken,
    RefreshProgress, RefreshStatus, RefreshSummary, Tag,
};
use ferret_llm::mock::MockProvider;
use futures::StreamExt;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// -- Fixture --

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    provider: MockProvider,
    indexer: CodebaseIndexer<MockProvider>,
}

impl Fixture {
    async fn new(files: &[(&str, &str)]) -> Self {
        Self::with(files, MockProvider::default(), IndexConfig::default()).await
    }

    async fn with(files: &[(&str, &str)], provider: MockProvider, config: IndexConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ws");
        std::fs::create_dir(&root).unwrap();
        for (name, content) in files {
            write(&root, name, content);
        }

        let db = dir.path().join("index.db");
        let store = IndexStore::open(db.to_str().unwrap()).await.unwrap();
        let indexer = CodebaseIndexer::new(
            Arc::new(FsWorkspace::new(vec![root.clone()])),
            store,
            Arc::new(provider.clone()),
            PauseToken::default(),
            &config,
        );

        Self {
            _dir: dir,
            root,
            provider,
            indexer,
        }
    }

    async fn refresh(&self) -> Vec<RefreshProgress> {
        self.indexer
            .refresh_dirs(vec![self.root.clone()], CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await
    }

    fn tag(&self, artifact: &str) -> Tag {
        Tag::new(NO_BRANCH, self.root.clone(), artifact)
    }

    async fn catalog_len(&self) -> usize {
        self.indexer
            .store()
            .catalog(&self.tag("chunks"))
            .await
            .unwrap()
            .len()
    }

    async fn hash_of(&self, name: &str) -> Option<String> {
        self.indexer
            .store()
            .content_hash(&self.tag("embeddings"), &self.root.join(name))
            .await
            .unwrap()
    }
}

fn write(root: &Path, name: &str, content: &str) {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn summarize(items: &[RefreshProgress]) -> RefreshSummary {
    let mut summary = RefreshSummary::default();
    for item in items {
        summary.record(item);
    }
    summary
}

fn numbered_files(n: usize) -> Vec<(String, String)> {
    (0..n)
        .map(|i| {
            (
                format!("mod_{i}.py"),
                format!("def function_{i}():\n    return {i}\n"),
            )
        })
        .collect()
}

fn as_refs(files: &[(String, String)]) -> Vec<(&str, &str)> {
    files
        .iter()
        .map(|(n, c)| (n.as_str(), c.as_str()))
        .collect()
}

// -- Refresh --

#[tokio::test]
async fn first_refresh_adds_every_file() {
    let fx = Fixture::new(&[
        ("src/lib.rs", "pub fn answer() -> u32 {\n    42\n}\n"),
        ("app.py", "def main():\n    print('hi')\n"),
        ("README.md", "# Title\n\nSome text.\n"),
    ])
    .await;

    let items = fx.refresh().await;
    assert_eq!(items.first().unwrap().status, RefreshStatus::Loading);
    let last = items.last().unwrap();
    assert_eq!(last.status, RefreshStatus::Done);
    assert!(last.is_terminal());

    let summary = summarize(&items);
    assert_eq!(summary.added, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(fx.catalog_len().await, 3);

    let progress: Vec<f32> = items
        .iter()
        .filter(|i| i.status == RefreshStatus::Indexing)
        .map(|i| i.progress)
        .collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!((progress[2] - 1.0).abs() < f32::EPSILON);
}

#[tokio::test]
async fn second_refresh_without_changes_is_a_no_op() {
    let fx = Fixture::new(&[("a.py", "x = 1\n"), ("b.py", "y = 2\n")]).await;

    fx.refresh().await;
    let calls = fx.provider.calls();

    let summary = summarize(&fx.refresh().await);
    assert_eq!(summary.added + summary.updated + summary.removed, 0);
    assert!(summary.done);
    assert_eq!(fx.provider.calls(), calls, "unchanged files reached an artifact");
}

#[tokio::test]
async fn diff_reports_added_updated_removed() {
    let fx = Fixture::new(&[("keep.py", "k = 1\n"), ("edit.py", "e = 1\n"), ("drop.py", "d = 1\n")])
        .await;
    fx.refresh().await;

    write(&fx.root, "edit.py", "e = 2\n");
    std::fs::remove_file(fx.root.join("drop.py")).unwrap();
    write(&fx.root, "new.py", "n = 1\n");
    let calls = fx.provider.calls();

    let items = fx.refresh().await;
    let per_file: Vec<(String, DiffKind)> = items
        .iter()
        .filter(|i| i.status == RefreshStatus::Indexing)
        .map(|i| {
            (
                i.file_path.as_ref().unwrap().file_name().unwrap().to_string_lossy().into_owned(),
                i.diff.unwrap(),
            )
        })
        .collect();
    assert_eq!(
        per_file,
        vec![
            ("drop.py".to_string(), DiffKind::Removed),
            ("edit.py".to_string(), DiffKind::Updated),
            ("new.py".to_string(), DiffKind::Added),
        ]
    );

    // One embedding batch each for edit.py and new.py.
    assert_eq!(fx.provider.calls(), calls + 2);
    assert_eq!(fx.hash_of("drop.py").await, None);
    assert_eq!(fx.catalog_len().await, 3);
}

#[tokio::test]
async fn enumeration_failure_is_returned_before_any_item() {
    let fx = Fixture::new(&[]).await;
    let missing = fx.root.join("missing");

    let result = fx
        .indexer
        .refresh_dirs(vec![missing.clone()], CancellationToken::new())
        .await;
    match result {
        Err(IndexError::Enumeration { directory, .. }) => assert_eq!(directory, missing),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("refresh of a missing directory succeeded"),
    }
}

#[tokio::test]
async fn empty_workspace_finishes_done() {
    let fx = Fixture::new(&[]).await;
    let items = fx.refresh().await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].status, RefreshStatus::Done);
    assert!((items[1].progress - 1.0).abs() < f32::EPSILON);
}

// -- Pause and cancellation --

#[tokio::test]
async fn pause_suspends_until_unpaused() {
    let files = numbered_files(4);
    let fx = Fixture::new(&as_refs(&files)).await;
    let pause = fx.indexer.pause_token().clone();

    let stream = fx
        .indexer
        .refresh_dirs(vec![fx.root.clone()], CancellationToken::new())
        .await
        .unwrap();
    futures::pin_mut!(stream);

    assert_eq!(stream.next().await.unwrap().status, RefreshStatus::Loading);
    assert_eq!(stream.next().await.unwrap().status, RefreshStatus::Indexing);

    pause.pause();
    let paused = stream.next().await.unwrap();
    assert_eq!(paused.status, RefreshStatus::Paused);

    let released = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&released);
    let handle = pause.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        flag.store(true, Ordering::SeqCst);
        handle.unpause();
    });

    let next = stream.next().await.unwrap();
    assert!(released.load(Ordering::SeqCst), "progressed while paused");
    assert_eq!(next.status, RefreshStatus::Indexing);

    let rest: Vec<RefreshProgress> = stream.collect().await;
    let after = rest
        .iter()
        .filter(|i| i.status == RefreshStatus::Indexing)
        .count();
    // One before the pause, one right after it, the rest here.
    assert_eq!(1 + 1 + after, 4);
    assert_eq!(rest.last().unwrap().status, RefreshStatus::Done);
}

#[tokio::test]
async fn cancel_after_two_files_then_resume_the_rest() {
    let files = numbered_files(5);
    let fx = Fixture::new(&as_refs(&files)).await;
    let cancel = CancellationToken::new();

    let stream = fx
        .indexer
        .refresh_dirs(vec![fx.root.clone()], cancel.clone())
        .await
        .unwrap();
    futures::pin_mut!(stream);

    let mut indexed = 0;
    let mut terminal = None;
    while let Some(item) = stream.next().await {
        if item.status == RefreshStatus::Indexing {
            indexed += 1;
            if indexed == 2 {
                cancel.cancel();
            }
        }
        if item.is_terminal() {
            terminal = Some(item);
        }
    }

    let terminal = terminal.unwrap();
    assert_eq!(terminal.status, RefreshStatus::Failed);
    assert!(terminal.cancelled);
    assert_eq!(indexed, 2);
    assert_eq!(fx.catalog_len().await, 2);

    let summary = summarize(&fx.refresh().await);
    assert_eq!(summary.added, 3);
    assert_eq!(fx.catalog_len().await, 5);
}

#[tokio::test]
async fn cancel_before_polling_commits_nothing() {
    let fx = Fixture::new(&[("a.py", "a = 1\n")]).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let items: Vec<RefreshProgress> = fx
        .indexer
        .refresh_dirs(vec![fx.root.clone()], cancel)
        .await
        .unwrap()
        .collect()
        .await;

    assert!(items.last().unwrap().cancelled);
    assert_eq!(fx.catalog_len().await, 0);
}

#[tokio::test]
async fn cancel_during_embedding_rolls_back_the_file() {
    let fx = Fixture::with(
        &[("slow.py", "def slow():\n    return 1\n")],
        MockProvider::default().with_delay(5_000),
        IndexConfig::default(),
    )
    .await;
    let cancel = CancellationToken::new();

    let stream = fx
        .indexer
        .refresh_dirs(vec![fx.root.clone()], cancel.clone())
        .await
        .unwrap();
    futures::pin_mut!(stream);
    assert_eq!(stream.next().await.unwrap().status, RefreshStatus::Loading);

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = tokio::time::Instant::now();
    let terminal = stream.next().await.unwrap();
    assert_eq!(terminal.status, RefreshStatus::Failed);
    assert!(terminal.cancelled);
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(stream.next().await.is_none());

    for table in ["file_metadata", "fts_metadata", "chunks", "embeddings"] {
        let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(fx.indexer.store().pool())
            .await
            .unwrap();
        assert_eq!(rows, 0, "{table} kept rows of a cancelled file");
    }
    assert_eq!(fx.catalog_len().await, 0);
    let hash = fx
        .indexer
        .store()
        .content_hash(&fx.tag("metadata"), &fx.root.join("slow.py"))
        .await
        .unwrap();
    assert_eq!(hash, None);
}

#[tokio::test]
async fn slow_embedding_does_not_block_other_writers() {
    let fx = Fixture::with(
        &[("slow.py", "def slow():\n    return 1\n")],
        MockProvider::default().with_delay(1_500),
        IndexConfig::default(),
    )
    .await;
    let other = Tag::new(NO_BRANCH, "/elsewhere", "chunks");

    let writer = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let started = tokio::time::Instant::now();
        let mut tx = fx.indexer.store().begin().await.unwrap();
        IndexStore::commit_hash(&mut tx, &other, Path::new("/elsewhere/x.py"), "h")
            .await
            .unwrap();
        tx.commit().await.unwrap();
        started.elapsed()
    };
    let (items, waited) = tokio::join!(fx.refresh(), writer);

    assert!(waited < Duration::from_secs(1), "writer waited {waited:?}");
    assert_eq!(summarize(&items).added, 1);
    assert_eq!(fx.catalog_len().await, 1);
}

// -- Failures --

#[tokio::test]
async fn failed_embedding_is_reported_and_retried() {
    let fx = Fixture::with(
        &[("good.py", "g = 1\n"), ("bad.py", "poison_marker = 1\n")],
        MockProvider::failing_on("poison_marker"),
        IndexConfig::default(),
    )
    .await;

    let items = fx.refresh().await;
    let failed: Vec<&RefreshProgress> = items
        .iter()
        .filter(|i| i.status == RefreshStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].file_path.as_deref(), Some(fx.root.join("bad.py").as_path()));
    assert!(!failed[0].cancelled);
    assert_eq!(items.last().unwrap().status, RefreshStatus::Done);

    assert!(fx.hash_of("good.py").await.is_some());
    assert_eq!(fx.hash_of("bad.py").await, None);

    // The good file is settled; the bad one is picked up again.
    let summary = summarize(&fx.refresh().await);
    assert_eq!(summary.added, 0);
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn oversized_file_is_skipped() {
    let mut config = IndexConfig::default();
    config.indexer.max_file_size = 16;
    let fx = Fixture::with(
        &[("small.py", "s = 1\n"), ("big.py", "big_value = 'xxxxxxxxxxxxxxxxxxxxxxxx'\n")],
        MockProvider::default(),
        config,
    )
    .await;

    let summary = summarize(&fx.refresh().await);
    assert_eq!(summary.added, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(fx.hash_of("big.py").await, None);
}

#[tokio::test]
async fn invalid_utf8_is_indexed_lossily() {
    let fx = Fixture::new(&[]).await;
    std::fs::write(fx.root.join("bytes.py"), b"name = 'caf\xe9'\n").unwrap();

    let summary = summarize(&fx.refresh().await);
    assert_eq!(summary.added, 1);
    assert_eq!(summary.failed, 0);
}

// -- refresh_files --

#[tokio::test]
async fn refresh_files_updates_only_the_listed_file() {
    let fx = Fixture::new(&[("one.py", "one = 1\n"), ("two.py", "two = 2\n")]).await;
    fx.refresh().await;
    let two_before = fx.hash_of("two.py").await;

    write(&fx.root, "one.py", "one = 'changed'\n");
    let items: Vec<RefreshProgress> = fx
        .indexer
        .refresh_files(vec![fx.root.join("one.py")], CancellationToken::new())
        .collect()
        .await;

    let per_file: Vec<&RefreshProgress> = items
        .iter()
        .filter(|i| i.file_path.is_some())
        .collect();
    assert_eq!(per_file.len(), 1);
    assert_eq!(per_file[0].diff, Some(DiffKind::Updated));
    assert_eq!(per_file[0].status, RefreshStatus::Indexing);

    assert_eq!(fx.hash_of("two.py").await, two_before);
    assert_ne!(fx.hash_of("one.py").await, None);

    // The refreshed hash matches disk, so a directory refresh finds nothing.
    let summary = summarize(&fx.refresh().await);
    assert_eq!(summary.indexed(), 0);
}

#[tokio::test]
async fn refresh_files_twice_leaves_identical_rows() {
    let fx = Fixture::new(&[("same.py", "def same():\n    return 'same'\n")]).await;
    fx.refresh().await;

    let snapshot = || async {
        sqlx::query_as::<_, (String, i64, String, i64, i64, String)>(
            "SELECT path, chunk_idx, content_hash, start_line, end_line, content FROM chunks ORDER BY path, chunk_idx",
        )
        .fetch_all(fx.indexer.store().pool())
        .await
        .unwrap()
    };

    let before = snapshot().await;
    let _: Vec<_> = fx
        .indexer
        .refresh_files(vec![fx.root.join("same.py")], CancellationToken::new())
        .collect()
        .await;
    assert_eq!(snapshot().await, before);
}

#[tokio::test]
async fn refresh_files_outside_workspace_fails_that_file() {
    let fx = Fixture::new(&[("in.py", "i = 1\n")]).await;

    let items: Vec<RefreshProgress> = fx
        .indexer
        .refresh_files(
            vec![PathBuf::from("/elsewhere/out.py"), fx.root.join("in.py")],
            CancellationToken::new(),
        )
        .collect()
        .await;

    let summary = summarize(&items);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.updated, 1);
    assert!(summary.done);
}

#[tokio::test]
async fn refresh_files_removes_deleted_file() {
    let fx = Fixture::new(&[("gone.py", "g = 1\n")]).await;
    fx.refresh().await;
    assert!(fx.hash_of("gone.py").await.is_some());

    std::fs::remove_file(fx.root.join("gone.py")).unwrap();
    let summary = RefreshSummary::collect(
        fx.indexer
            .refresh_files(vec![fx.root.join("gone.py")], CancellationToken::new()),
    )
    .await;

    assert_eq!(summary.removed, 1);
    assert_eq!(fx.hash_of("gone.py").await, None);
}

// -- clear_indexes --

#[tokio::test]
async fn clear_indexes_drops_everything() {
    let fx = Fixture::new(&[("a.py", "a = 1\n"), ("b.py", "b = 2\n")]).await;
    fx.refresh().await;
    assert_eq!(fx.catalog_len().await, 2);

    fx.indexer.clear_indexes().await.unwrap();
    assert_eq!(fx.catalog_len().await, 0);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
        .fetch_one(fx.indexer.store().pool())
        .await
        .unwrap();
    assert_eq!(rows, 0);

    // Everything is new again.
    let summary = summarize(&fx.refresh().await);
    assert_eq!(summary.added, 2);
}
