//! Error types for ferret-index.

use std::num::TryFromIntError;
use std::path::PathBuf;

/// Errors that can occur during indexing and retrieval.
///
/// Only [`IndexError::Enumeration`] and [`IndexError::Configuration`] are
/// returned to callers of the refresh and pipeline entry points; everything
/// raised while updating a single file is reported in the progress stream.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading source files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `SQLite` database error.
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// Embedded migration failed.
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Embeddings provider error.
    #[error("embeddings provider error: {0}")]
    Provider(#[from] ferret_llm::LlmError),

    /// Tree-sitter parsing error.
    #[error("parse failed: {0}")]
    Parse(String),

    /// A directory could not be enumerated. Fatal to the refresh call.
    #[error("cannot enumerate {}: {reason}", directory.display())]
    Enumeration { directory: PathBuf, reason: String },

    /// An artifact rejected a file update.
    #[error("{artifact} update failed: {reason}")]
    Artifact {
        artifact: &'static str,
        reason: String,
    },

    /// A file is larger than the configured limit and was not indexed.
    #[error("{} is {size} bytes, over the {limit} byte limit", path.display())]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    /// The refresh was cancelled by the caller.
    #[error("indexing cancelled")]
    Cancelled,

    /// Invalid configuration, detected at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// File watcher error.
    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// Integer conversion error.
    #[error("integer conversion failed: {0}")]
    IntConversion(#[from] TryFromIntError),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
