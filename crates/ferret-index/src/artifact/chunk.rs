use std::path::Path;

use sqlx::{SqliteConnection, SqlitePool};

use super::{ArtifactOutcome, FileEntry};
use crate::chunker::{ChunkerConfig, chunk_file};
use crate::error::Result;
use crate::store::path_key;
use crate::tag::Tag;

/// Bounded AST chunks of each file, with their line ranges.
#[derive(Debug, Clone, Default)]
pub struct ChunkIndex {
    config: ChunkerConfig,
}

/// A chunk row as persisted.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredChunk {
    pub chunk_idx: i64,
    pub content_hash: String,
    pub start_line: i64,
    pub end_line: i64,
    pub node_type: String,
    pub entity_name: Option<String>,
    pub content: String,
}

impl ChunkIndex {
    #[must_use]
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub(super) async fn index(
        &self,
        conn: &mut SqliteConnection,
        tag: &Tag,
        file: &FileEntry,
        content: &str,
    ) -> Result<ArtifactOutcome> {
        Self::remove(conn, tag, &file.path).await?;

        let chunks = chunk_file(content, file.language, &self.config)?;
        let key = tag.key();
        let path = path_key(&file.path);

        for (idx, chunk) in chunks.iter().enumerate() {
            sqlx::query(
                "INSERT INTO chunks \
                 (tag, path, chunk_idx, content_hash, start_line, end_line, node_type, entity_name, content) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&key)
            .bind(&path)
            .bind(i64::try_from(idx)?)
            .bind(&chunk.content_hash)
            .bind(i64::try_from(chunk.line_range.0)?)
            .bind(i64::try_from(chunk.line_range.1)?)
            .bind(&chunk.node_type)
            .bind(chunk.entity_name.as_deref())
            .bind(&chunk.code)
            .execute(&mut *conn)
            .await?;
        }

        tracing::debug!(path = %file.path.display(), chunks = chunks.len(), "chunked");
        Ok(ArtifactOutcome {
            records: chunks.len(),
            failed: 0,
        })
    }

    pub(super) async fn remove(conn: &mut SqliteConnection, tag: &Tag, path: &Path) -> Result<()> {
        sqlx::query("DELETE FROM chunks WHERE tag = ? AND path = ?")
            .bind(tag.key())
            .bind(path_key(path))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub(super) async fn clear(conn: &mut SqliteConnection, tag: &Tag) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE tag = ?")
            .bind(tag.key())
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Stored chunks of one file, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn chunks(pool: &SqlitePool, tag: &Tag, path: &Path) -> Result<Vec<StoredChunk>> {
        let rows = sqlx::query_as::<_, StoredChunk>(
            "SELECT chunk_idx, content_hash, start_line, end_line, node_type, entity_name, content \
             FROM chunks WHERE tag = ? AND path = ? ORDER BY chunk_idx",
        )
        .bind(tag.key())
        .bind(path_key(path))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}
