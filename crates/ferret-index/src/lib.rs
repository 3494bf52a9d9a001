//! Incremental, multi-artifact codebase index.
//!
//! A workspace is indexed into several parallel representations (file
//! metadata, FTS5 full text, AST chunks, embedding vectors), each scoped by a
//! [`Tag`] of branch, directory and artifact. [`CodebaseIndexer`] keeps them
//! in step with the files by diffing content hashes against a catalog, and a
//! [`RetrievalPipeline`] serves ranked snippets from the searchable ones.

pub mod artifact;
pub(crate) mod chunker;
pub mod config;
pub(crate) mod context;
pub mod diff;
pub mod error;
pub mod indexer;
pub mod languages;
pub mod pause;
pub mod progress;
pub mod retrieval;
pub mod store;
pub mod tag;
pub mod watcher;
pub mod workspace;

pub use artifact::{ArtifactKind, FileEntry};
pub use chunker::ChunkerConfig;
pub use config::IndexConfig;
pub use diff::DiffKind;
pub use error::{IndexError, Result};
pub use indexer::{CodebaseIndexer, RefreshStream};
pub use pause::PauseToken;
pub use progress::{RefreshProgress, RefreshStatus, RefreshSummary};
pub use retrieval::{NoRerankerPipeline, RetrievalPipeline, RetrievalQuery, RetrievalResult};
pub use store::IndexStore;
pub use tag::{BranchAndDir, Tag};
pub use watcher::IndexWatcher;
pub use workspace::{FsWorkspace, WorkspaceReader};
