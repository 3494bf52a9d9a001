//! Classify workspace files against the last indexed state.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{IndexStore, path_key};
use crate::tag::Tag;

/// What happened to a file since the last refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Added,
    Updated,
    Removed,
    Unchanged,
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Removed => "removed",
            Self::Unchanged => "unchanged",
        })
    }
}

/// Classify a listed file from its current hash and the hash recorded under
/// each artifact tag (`None` where a tag has no record).
#[must_use]
pub fn classify(current: &str, recorded: &[Option<&str>]) -> DiffKind {
    if recorded.iter().all(Option::is_none) {
        DiffKind::Added
    } else if recorded.iter().all(|h| *h == Some(current)) {
        DiffKind::Unchanged
    } else {
        DiffKind::Updated
    }
}

/// One file that needs work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: PathBuf,
    pub kind: DiffKind,
    /// Current hash for added/updated files, last recorded hash for removed
    /// ones.
    pub content_hash: String,
}

/// Diff the listed files of one directory against the catalog.
///
/// `listed` holds every enumerated path; `hashes` the ones that could be
/// read. Listed-but-unreadable files are neither diffed nor treated as
/// removed. Unchanged files are omitted from the result. Output is sorted by
/// path.
///
/// # Errors
///
/// Returns an error if the catalog cannot be read.
pub async fn compute_diff(
    store: &IndexStore,
    tags: &[Tag],
    listed: &[PathBuf],
    hashes: &HashMap<PathBuf, String>,
) -> Result<Vec<FileDiff>> {
    let mut catalogs = Vec::with_capacity(tags.len());
    for tag in tags {
        catalogs.push(store.catalog(tag).await?);
    }

    let mut diffs = Vec::new();
    for path in listed {
        let Some(current) = hashes.get(path) else {
            continue;
        };
        let key = path_key(path);
        let recorded: Vec<Option<&str>> = catalogs
            .iter()
            .map(|c| c.get(&key).map(String::as_str))
            .collect();
        let kind = classify(current, &recorded);
        if kind != DiffKind::Unchanged {
            diffs.push(FileDiff {
                path: path.clone(),
                kind,
                content_hash: current.clone(),
            });
        }
    }

    let listed_keys: HashSet<String> = listed.iter().map(|p| path_key(p)).collect();
    let mut removed: BTreeMap<&str, &str> = BTreeMap::new();
    for catalog in &catalogs {
        for (path, hash) in catalog {
            if !listed_keys.contains(path) {
                removed.entry(path.as_str()).or_insert(hash.as_str());
            }
        }
    }
    diffs.extend(removed.into_iter().map(|(path, hash)| FileDiff {
        path: PathBuf::from(path),
        kind: DiffKind::Removed,
        content_hash: hash.to_owned(),
    }));

    diffs.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(diffs)
}
