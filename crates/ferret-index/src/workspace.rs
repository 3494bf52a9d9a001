//! Access to the files being indexed.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use crate::error::{IndexError, Result};
use crate::languages::is_indexable;
use crate::tag::{NO_BRANCH, Tag};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Read side of a workspace: its root directories, their files, and the
/// branch each root is checked out on.
pub trait WorkspaceReader: Send + Sync {
    fn workspace_dirs(&self) -> Vec<PathBuf>;

    /// Every indexable file under `dir`, sorted.
    fn list_files<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, Result<Vec<PathBuf>>>;

    fn read_file<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Vec<u8>>>;

    fn branch<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, String>;

    /// One tag per workspace directory for `artifact_id`.
    fn get_tags<'a>(&'a self, artifact_id: &'a str) -> BoxFuture<'a, Vec<Tag>> {
        Box::pin(async move {
            let mut tags = Vec::new();
            for dir in self.workspace_dirs() {
                let branch = self.branch(&dir).await;
                tags.push(Tag::new(branch, dir, artifact_id));
            }
            tags
        })
    }
}

/// Local filesystem workspace. Honors `.gitignore` and skips hidden files.
#[derive(Debug, Clone)]
pub struct FsWorkspace {
    dirs: Vec<PathBuf>,
}

impl FsWorkspace {
    #[must_use]
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

impl WorkspaceReader for FsWorkspace {
    fn workspace_dirs(&self) -> Vec<PathBuf> {
        self.dirs.clone()
    }

    fn list_files<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, Result<Vec<PathBuf>>> {
        Box::pin(async move {
            let enumeration = |reason: String| IndexError::Enumeration {
                directory: dir.to_path_buf(),
                reason,
            };

            let meta = tokio::fs::metadata(dir)
                .await
                .map_err(|e| enumeration(e.to_string()))?;
            if !meta.is_dir() {
                return Err(enumeration("not a directory".into()));
            }

            let root = dir.to_path_buf();
            let mut files = tokio::task::spawn_blocking(move || walk(&root))
                .await
                .map_err(|e| enumeration(e.to_string()))?;
            files.sort();
            Ok(files)
        })
    }

    fn read_file<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move { Ok(tokio::fs::read(path).await?) })
    }

    fn branch<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, String> {
        Box::pin(async move {
            for ancestor in dir.ancestors() {
                match tokio::fs::read_to_string(ancestor.join(".git").join("HEAD")).await {
                    Ok(head) => return parse_head(&head),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::debug!(dir = %dir.display(), "cannot read HEAD: {e}");
                        break;
                    }
                }
            }
            NO_BRANCH.to_string()
        })
    }
}

fn walk(root: &Path) -> Vec<PathBuf> {
    ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .build()
        .flatten()
        .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()) && is_indexable(e.path()))
        .map(ignore::DirEntry::into_path)
        .collect()
}

fn parse_head(head: &str) -> String {
    let head = head.trim();
    match head.strip_prefix("ref: ") {
        Some(reference) => reference
            .strip_prefix("refs/heads/")
            .unwrap_or(reference)
            .to_string(),
        None if head.is_empty() => NO_BRANCH.to_string(),
        // Detached HEAD.
        None => head.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_head_variants() {
        assert_eq!(parse_head("ref: refs/heads/main\n"), "main");
        assert_eq!(parse_head("ref: refs/heads/feature/x"), "feature/x");
        assert_eq!(parse_head("3f2a9c"), "3f2a9c");
        assert_eq!(parse_head(""), NO_BRANCH);
    }

    #[tokio::test]
    async fn list_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.rs"), "fn b() {}").unwrap();
        std::fs::write(dir.path().join("a.py"), "def a(): pass").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();
        std::fs::create_dir(dir.path().join(".hidden")).unwrap();
        std::fs::write(dir.path().join(".hidden/c.rs"), "fn c() {}").unwrap();

        let ws = FsWorkspace::new(vec![dir.path().to_path_buf()]);
        let files = ws.list_files(dir.path()).await.unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.py"), dir.path().join("b.rs")]
        );
    }

    #[tokio::test]
    async fn list_files_missing_dir_is_enumeration_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let ws = FsWorkspace::new(vec![missing.clone()]);
        let err = ws.list_files(&missing).await.unwrap_err();
        assert!(matches!(err, IndexError::Enumeration { directory, .. } if directory == missing));
    }

    #[tokio::test]
    async fn branch_reads_git_head() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/dev\n").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();

        let ws = FsWorkspace::new(vec![dir.path().join("src")]);
        assert_eq!(ws.branch(&dir.path().join("src")).await, "dev");

        let tags = ws.get_tags("chunks").await;
        assert_eq!(tags, vec![Tag::new("dev", dir.path().join("src"), "chunks")]);
    }

    #[tokio::test]
    async fn branch_defaults_outside_git() {
        let dir = tempfile::tempdir().unwrap();
        let ws = FsWorkspace::new(vec![dir.path().to_path_buf()]);
        // tempdir may sit under a checkout on some machines; only assert when
        // no HEAD is reachable.
        let reachable = dir
            .path()
            .ancestors()
            .any(|a| a.join(".git").join("HEAD").exists());
        if !reachable {
            assert_eq!(ws.branch(dir.path()).await, NO_BRANCH);
        }
    }
}
