//! Index scopes.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Branch name used when a directory is not inside a git checkout.
pub const NO_BRANCH: &str = "NONE";

/// One (branch, directory, artifact) scope.
///
/// Tags namespace every persisted row, so a workspace indexed on two
/// branches, or under two roots, yields disjoint record sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub branch: String,
    pub directory: PathBuf,
    pub artifact_id: String,
}

impl Tag {
    #[must_use]
    pub fn new(
        branch: impl Into<String>,
        directory: impl Into<PathBuf>,
        artifact_id: impl Into<String>,
    ) -> Self {
        Self {
            branch: branch.into(),
            directory: directory.into(),
            artifact_id: artifact_id.into(),
        }
    }

    /// Stable string form used as the row key in every table.
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "{}::{}::{}",
            self.directory.display(),
            self.branch,
            self.artifact_id
        )
    }

    /// Same branch and directory, different artifact.
    #[must_use]
    pub fn with_artifact(&self, artifact_id: &str) -> Self {
        Self {
            branch: self.branch.clone(),
            directory: self.directory.clone(),
            artifact_id: artifact_id.to_owned(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// A branch/directory pair a caller queries against, before it is bound to an
/// artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchAndDir {
    pub branch: String,
    pub directory: PathBuf,
}

impl BranchAndDir {
    #[must_use]
    pub fn tag(&self, artifact_id: &str) -> Tag {
        Tag::new(self.branch.clone(), self.directory.clone(), artifact_id)
    }
}
