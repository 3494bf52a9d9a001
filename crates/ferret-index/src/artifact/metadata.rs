use std::collections::BTreeMap;
use std::path::Path;

use sqlx::{SqliteConnection, SqlitePool};

use super::{ArtifactOutcome, FileEntry};
use crate::error::Result;
use crate::store::path_key;
use crate::tag::Tag;

/// Per-file key/value facts: language, extension, size, line count, hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataIndex;

impl MetadataIndex {
    pub(super) async fn index(
        &self,
        conn: &mut SqliteConnection,
        tag: &Tag,
        file: &FileEntry,
        content: &str,
    ) -> Result<ArtifactOutcome> {
        Self::remove(conn, tag, &file.path).await?;

        let entries = [
            (
                "language",
                file.language.map_or_else(|| "unknown".to_string(), |l| l.id().to_string()),
            ),
            (
                "extension",
                file.path
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ),
            ("size_bytes", file.size_bytes.to_string()),
            ("line_count", content.lines().count().to_string()),
            ("content_hash", file.content_hash.clone()),
        ];

        let key = tag.key();
        let path = path_key(&file.path);
        for (name, value) in &entries {
            sqlx::query("INSERT INTO file_metadata (tag, path, key, value) VALUES (?, ?, ?, ?)")
                .bind(&key)
                .bind(&path)
                .bind(*name)
                .bind(value)
                .execute(&mut *conn)
                .await?;
        }

        Ok(ArtifactOutcome {
            records: entries.len(),
            failed: 0,
        })
    }

    pub(super) async fn remove(conn: &mut SqliteConnection, tag: &Tag, path: &Path) -> Result<()> {
        sqlx::query("DELETE FROM file_metadata WHERE tag = ? AND path = ?")
            .bind(tag.key())
            .bind(path_key(path))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub(super) async fn clear(conn: &mut SqliteConnection, tag: &Tag) -> Result<u64> {
        let result = sqlx::query("DELETE FROM file_metadata WHERE tag = ?")
            .bind(tag.key())
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Stored facts for one file.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(pool: &SqlitePool, tag: &Tag, path: &Path) -> Result<BTreeMap<String, String>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM file_metadata WHERE tag = ? AND path = ?")
                .bind(tag.key())
                .bind(path_key(path))
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().collect())
    }
}
