use std::collections::HashSet;
use std::path::Path;

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use super::{ArtifactKind, ArtifactOutcome, FileEntry};
use crate::error::Result;
use crate::retrieval::RetrievalResult;
use crate::store::{dir_prefix, path_key};
use crate::tag::Tag;

/// Shortest term the trigram tokenizer can match.
const MIN_TERM_CHARS: usize = 3;
const MAX_TERMS: usize = 32;
/// `bm25` weight of the path column relative to content.
const PATH_WEIGHT: f64 = 10.0;

/// FTS5 (trigram) index over fixed line windows of each file.
#[derive(Debug, Clone, Copy)]
pub struct FullTextIndex {
    segment_lines: usize,
}

impl FullTextIndex {
    #[must_use]
    pub fn new(segment_lines: usize) -> Self {
        Self {
            segment_lines: segment_lines.max(1),
        }
    }

    pub(super) async fn index(
        &self,
        conn: &mut SqliteConnection,
        tag: &Tag,
        file: &FileEntry,
        content: &str,
    ) -> Result<ArtifactOutcome> {
        Self::remove(conn, tag, &file.path).await?;

        let key = tag.key();
        let path = path_key(&file.path);
        let lines: Vec<&str> = content.lines().collect();
        let mut records = 0;

        for (idx, window) in lines.chunks(self.segment_lines).enumerate() {
            let text = window.join("\n");
            if text.trim().is_empty() {
                continue;
            }
            let start_line = idx * self.segment_lines + 1;
            let end_line = start_line + window.len() - 1;

            let rowid = sqlx::query("INSERT INTO fts (path, content) VALUES (?, ?)")
                .bind(&path)
                .bind(&text)
                .execute(&mut *conn)
                .await?
                .last_insert_rowid();

            sqlx::query(
                "INSERT INTO fts_metadata (tag, path, segment_idx, fts_rowid, start_line, end_line) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&key)
            .bind(&path)
            .bind(i64::try_from(idx)?)
            .bind(rowid)
            .bind(i64::try_from(start_line)?)
            .bind(i64::try_from(end_line)?)
            .execute(&mut *conn)
            .await?;
            records += 1;
        }

        Ok(ArtifactOutcome { records, failed: 0 })
    }

    pub(super) async fn remove(conn: &mut SqliteConnection, tag: &Tag, path: &Path) -> Result<()> {
        let key = tag.key();
        let path = path_key(path);
        sqlx::query(
            "DELETE FROM fts WHERE rowid IN \
             (SELECT fts_rowid FROM fts_metadata WHERE tag = ? AND path = ?)",
        )
        .bind(&key)
        .bind(&path)
        .execute(&mut *conn)
        .await?;
        sqlx::query("DELETE FROM fts_metadata WHERE tag = ? AND path = ?")
            .bind(&key)
            .bind(&path)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub(super) async fn clear(conn: &mut SqliteConnection, tag: &Tag) -> Result<u64> {
        let key = tag.key();
        sqlx::query("DELETE FROM fts WHERE rowid IN (SELECT fts_rowid FROM fts_metadata WHERE tag = ?)")
            .bind(&key)
            .execute(&mut *conn)
            .await?;
        let result = sqlx::query("DELETE FROM fts_metadata WHERE tag = ?")
            .bind(&key)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Best `limit` segments matching `text`, scored by negated `bm25` (higher
    /// is better).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn retrieve(
        pool: &SqlitePool,
        tags: &[Tag],
        filter_directory: Option<&Path>,
        text: &str,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let Some(query) = fts_query(text) else {
            return Ok(Vec::new());
        };
        if tags.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT fts_metadata.path, fts_metadata.start_line, fts_metadata.end_line, \
             fts.content, bm25(fts, {PATH_WEIGHT:.1}, 1.0) AS score \
             FROM fts JOIN fts_metadata ON fts.rowid = fts_metadata.fts_rowid \
             WHERE fts MATCH "
        ));
        qb.push_bind(query);
        qb.push(" AND fts_metadata.tag IN (");
        let mut keys = qb.separated(", ");
        for tag in tags {
            keys.push_bind(tag.key());
        }
        qb.push(")");
        if let Some(dir) = filter_directory {
            let prefix = dir_prefix(dir);
            qb.push(" AND substr(fts_metadata.path, 1, ");
            qb.push_bind(i64::try_from(prefix.chars().count())?);
            qb.push(") = ");
            qb.push_bind(prefix);
        }
        qb.push(" ORDER BY score LIMIT ");
        qb.push_bind(i64::try_from(limit)?);

        let rows: Vec<(String, i64, i64, String, f64)> =
            qb.build_query_as().fetch_all(pool).await?;

        rows.into_iter()
            .map(|(filepath, start, end, content, bm25)| {
                Ok(RetrievalResult {
                    filepath,
                    content,
                    score: relevance(bm25),
                    start_line: usize::try_from(start)?,
                    end_line: usize::try_from(end)?,
                    source: ArtifactKind::FullText,
                })
            })
            .collect()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn relevance(bm25: f64) -> f32 {
    (-bm25) as f32
}

/// FTS5 match expression for free text: identifier-like terms of at least
/// three characters, deduplicated, quoted, OR-ed. `None` when nothing
/// survives.
#[must_use]
pub fn fts_query(text: &str) -> Option<String> {
    let mut seen = HashSet::new();
    let terms: Vec<String> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= MIN_TERM_CHARS)
        .map(str::to_lowercase)
        .filter(|t| seen.insert(t.clone()))
        .take(MAX_TERMS)
        .map(|t| format!("\"{t}\""))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}
