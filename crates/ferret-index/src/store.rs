//! `SQLite` persistence: pool setup, migrations, and the tag catalog that maps
//! (tag, path) to the last indexed content hash.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::error::Result;
use crate::tag::Tag;

/// Handle on the index database. Owned by the indexer; artifacts get
/// connections from it but only the indexer writes the catalog.
#[derive(Debug, Clone)]
pub struct IndexStore {
    pool: SqlitePool,
}

impl IndexStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database on a single
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn open(path: &str) -> Result<Self> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let mut opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Normal);
        if !in_memory {
            opts = opts.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(opts)
            .await?;

        sqlx::migrate!().run(&pool).await?;
        tracing::debug!(path, "index store opened");

        Ok(Self { pool })
    }

    /// Expose the pool for read paths (retrieval, inspection).
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start the transaction that covers one file's artifact writes and its
    /// catalog commit.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection is available.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// All (path, hash) records for a tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn catalog(&self, tag: &Tag) -> Result<HashMap<String, String>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT path, content_hash FROM tag_catalog WHERE tag = ?")
                .bind(tag.key())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    /// Last committed hash for one (tag, path).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn content_hash(&self, tag: &Tag, path: &Path) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT content_hash FROM tag_catalog WHERE tag = ? AND path = ?")
                .bind(tag.key())
                .bind(path_key(path))
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(h,)| h))
    }

    /// Record `hash` as indexed for (tag, path).
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn commit_hash(
        conn: &mut SqliteConnection,
        tag: &Tag,
        path: &Path,
        hash: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO tag_catalog (tag, path, content_hash, last_updated) VALUES (?, ?, ?, ?) \
             ON CONFLICT (tag, path) DO UPDATE SET \
             content_hash = excluded.content_hash, last_updated = excluded.last_updated",
        )
        .bind(tag.key())
        .bind(path_key(path))
        .bind(hash)
        .bind(unix_now())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Drop the record for (tag, path).
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn forget(conn: &mut SqliteConnection, tag: &Tag, path: &Path) -> Result<()> {
        sqlx::query("DELETE FROM tag_catalog WHERE tag = ? AND path = ?")
            .bind(tag.key())
            .bind(path_key(path))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Drop every record for a tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn forget_tag(conn: &mut SqliteConnection, tag: &Tag) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tag_catalog WHERE tag = ?")
            .bind(tag.key())
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Key a path is stored under.
pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `path` prefix that matches files under `dir` and nothing else.
pub(crate) fn dir_prefix(dir: &Path) -> String {
    let mut prefix = path_key(dir);
    if !prefix.ends_with(std::path::MAIN_SEPARATOR) {
        prefix.push(std::path::MAIN_SEPARATOR);
    }
    prefix
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
