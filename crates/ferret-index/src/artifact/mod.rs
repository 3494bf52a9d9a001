//! The persisted representations a file is indexed into.
//!
//! Every artifact owns its own tables and writes them through the
//! connection of the per-file transaction, so a file is either fully
//! indexed by every artifact or not at all. Provider calls happen in
//! [`Artifact::prepare`], before that transaction opens.

mod chunk;
mod embeddings;
mod full_text;
mod metadata;

use std::fmt;
use std::path::{Path, PathBuf};

use ferret_llm::EmbeddingsProvider;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

pub use chunk::{ChunkIndex, StoredChunk};
pub use embeddings::EmbeddingsIndex;
use embeddings::EmbeddedChunk;
pub use full_text::{FullTextIndex, fts_query};
pub use metadata::MetadataIndex;

use crate::diff::DiffKind;
use crate::error::{IndexError, Result};
use crate::languages::{Lang, detect_language};
use crate::tag::Tag;

/// Artifact variants. Order of [`ArtifactKind::ORDER`] is the order updates
/// are applied in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Metadata,
    FullText,
    Chunk,
    Embeddings,
}

impl ArtifactKind {
    pub const ORDER: [Self; 4] = [Self::Metadata, Self::FullText, Self::Chunk, Self::Embeddings];

    /// Artifact id used in tags.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::FullText => "fts",
            Self::Chunk => "chunks",
            Self::Embeddings => "embeddings",
        }
    }

    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ORDER.into_iter().find(|k| k.id() == id)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A file handed to the artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    /// BLAKE3 hex of the raw bytes.
    pub content_hash: String,
    /// Length of the raw bytes, before decoding.
    pub size_bytes: u64,
    /// `None` for removed files.
    pub content: Option<String>,
    pub language: Option<Lang>,
}

impl FileEntry {
    /// Entry for a file read from disk. Invalid UTF-8 is replaced.
    #[must_use]
    pub fn from_bytes(path: PathBuf, bytes: &[u8]) -> Self {
        let content = String::from_utf8_lossy(bytes).into_owned();
        let language = detect_language(&path);
        Self {
            content_hash: hash_bytes(bytes),
            size_bytes: bytes.len() as u64,
            content: Some(content),
            language,
            path,
        }
    }

    /// Entry for a file that no longer exists.
    #[must_use]
    pub fn removed(path: PathBuf, content_hash: String) -> Self {
        Self {
            language: detect_language(&path),
            path,
            content_hash,
            size_bytes: 0,
            content: None,
        }
    }
}

/// BLAKE3 hex digest of file bytes.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// What an artifact did for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtifactOutcome {
    pub records: usize,
    /// Records written in a degraded state; the file must be retried.
    pub failed: usize,
}

/// Results an artifact computed for one file outside the transaction.
#[derive(Debug, Default)]
pub struct Prepared {
    embedded: Option<Vec<EmbeddedChunk>>,
}

/// One artifact, dispatched over its closed set of kinds.
#[derive(Debug)]
pub enum Artifact<P> {
    Metadata(MetadataIndex),
    FullText(FullTextIndex),
    Chunk(ChunkIndex),
    Embeddings(EmbeddingsIndex<P>),
}

impl<P: EmbeddingsProvider> Artifact<P> {
    #[must_use]
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Metadata(_) => ArtifactKind::Metadata,
            Self::FullText(_) => ArtifactKind::FullText,
            Self::Chunk(_) => ArtifactKind::Chunk,
            Self::Embeddings(_) => ArtifactKind::Embeddings,
        }
    }

    /// Do the slow, storage-free part of an update: embedding chunks for
    /// the embeddings artifact, nothing for the others.
    ///
    /// # Errors
    ///
    /// Returns an error if the file has no content or cannot be chunked.
    pub async fn prepare(&self, file: &FileEntry, diff: DiffKind) -> Result<Prepared> {
        match (self, diff) {
            (Self::Embeddings(a), DiffKind::Added | DiffKind::Updated) => {
                let content = self.content(file)?;
                Ok(Prepared {
                    embedded: Some(a.embed(file, content).await?),
                })
            }
            _ => Ok(Prepared::default()),
        }
    }

    /// Bring this artifact's rows for `file` in line with `diff`.
    ///
    /// Removed files lose their rows; added and updated files have theirs
    /// replaced. Unchanged files are left alone. `prepared` should come from
    /// [`Artifact::prepare`]; if it is empty the embeddings are computed here.
    ///
    /// # Errors
    ///
    /// Returns an error if the file has no content to index or a write fails.
    pub async fn update(
        &self,
        conn: &mut SqliteConnection,
        tag: &Tag,
        file: &FileEntry,
        diff: DiffKind,
        prepared: Prepared,
    ) -> Result<ArtifactOutcome> {
        match diff {
            DiffKind::Unchanged => Ok(ArtifactOutcome::default()),
            DiffKind::Removed => {
                self.remove(conn, tag, &file.path).await?;
                Ok(ArtifactOutcome::default())
            }
            DiffKind::Added | DiffKind::Updated => {
                let content = self.content(file)?;
                match self {
                    Self::Metadata(a) => a.index(conn, tag, file, content).await,
                    Self::FullText(a) => a.index(conn, tag, file, content).await,
                    Self::Chunk(a) => a.index(conn, tag, file, content).await,
                    Self::Embeddings(a) => {
                        let embedded = match prepared.embedded {
                            Some(embedded) => embedded,
                            None => a.embed(file, content).await?,
                        };
                        EmbeddingsIndex::<P>::write(conn, tag, file, &embedded).await
                    }
                }
            }
        }
    }

    fn content<'f>(&self, file: &'f FileEntry) -> Result<&'f str> {
        file.content.as_deref().ok_or_else(|| IndexError::Artifact {
            artifact: self.kind().id(),
            reason: format!("no content for {}", file.path.display()),
        })
    }

    async fn remove(&self, conn: &mut SqliteConnection, tag: &Tag, path: &Path) -> Result<()> {
        match self {
            Self::Metadata(_) => MetadataIndex::remove(conn, tag, path).await,
            Self::FullText(_) => FullTextIndex::remove(conn, tag, path).await,
            Self::Chunk(_) => ChunkIndex::remove(conn, tag, path).await,
            Self::Embeddings(_) => EmbeddingsIndex::<P>::remove(conn, tag, path).await,
        }
    }

    /// Drop every row this artifact holds for `tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if a delete fails.
    pub async fn clear(&self, conn: &mut SqliteConnection, tag: &Tag) -> Result<u64> {
        match self {
            Self::Metadata(_) => MetadataIndex::clear(conn, tag).await,
            Self::FullText(_) => FullTextIndex::clear(conn, tag).await,
            Self::Chunk(_) => ChunkIndex::clear(conn, tag).await,
            Self::Embeddings(_) => EmbeddingsIndex::<P>::clear(conn, tag).await,
        }
    }
}
