use std::path::Path;
use std::sync::Arc;

use ferret_llm::{EmbeddingsProvider, LlmError};
use futures::{StreamExt, stream};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use super::{ArtifactKind, ArtifactOutcome, FileEntry};
use crate::chunker::{ChunkerConfig, chunk_file};
use crate::context::contextualize_for_embedding;
use crate::error::Result;
use crate::retrieval::RetrievalResult;
use crate::store::{dir_prefix, path_key};
use crate::tag::Tag;

const STATUS_OK: &str = "ok";
const STATUS_FAILED: &str = "failed";

/// A chunk with its vector, or `None` when its batch failed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EmbeddedChunk {
    start_line: usize,
    end_line: usize,
    content: String,
    vector: Option<Vec<f32>>,
}

/// Embedding vectors of each chunk, searched by cosine similarity.
///
/// A batch the provider rejects leaves its chunks stored with a `failed`
/// status and no vector; they are skipped by retrieval and the outcome
/// reports them so the file is retried.
#[derive(Debug)]
pub struct EmbeddingsIndex<P> {
    provider: Arc<P>,
    chunker: ChunkerConfig,
    batch_size: usize,
    max_concurrency: usize,
}

impl<P> Clone for EmbeddingsIndex<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            chunker: self.chunker.clone(),
            batch_size: self.batch_size,
            max_concurrency: self.max_concurrency,
        }
    }
}

impl<P: EmbeddingsProvider> EmbeddingsIndex<P> {
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        chunker: ChunkerConfig,
        batch_size: usize,
        max_concurrency: usize,
    ) -> Self {
        Self {
            provider,
            chunker,
            batch_size: batch_size.max(1),
            max_concurrency: max_concurrency.max(1),
        }
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Chunk `content` and embed every chunk. Touches no table, so it runs
    /// before the file's transaction opens.
    pub(super) async fn embed(&self, file: &FileEntry, content: &str) -> Result<Vec<EmbeddedChunk>> {
        let chunks = chunk_file(content, file.language, &self.chunker)?;
        let texts: Vec<String> = chunks
            .iter()
            .map(|c| contextualize_for_embedding(c, &file.path, file.language))
            .collect();

        let requests: Vec<_> = texts
            .chunks(self.batch_size)
            .map(|batch| async move { (batch.len(), self.provider.embed_batch(batch).await) })
            .collect();
        let batches: Vec<(usize, std::result::Result<Vec<Vec<f32>>, LlmError>)> =
            stream::iter(requests)
                .buffered(self.max_concurrency)
                .collect()
                .await;

        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(chunks.len());
        for (len, result) in batches {
            match result {
                Ok(batch) if batch.len() == len => vectors.extend(batch.into_iter().map(Some)),
                Ok(batch) => {
                    tracing::warn!(
                        path = %file.path.display(),
                        expected = len,
                        got = batch.len(),
                        "embedding batch size mismatch"
                    );
                    vectors.extend(std::iter::repeat_n(None, len));
                }
                Err(e) => {
                    tracing::warn!(
                        path = %file.path.display(),
                        provider = self.provider.name(),
                        "embedding batch failed: {e}"
                    );
                    vectors.extend(std::iter::repeat_n(None, len));
                }
            }
        }

        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk {
                start_line: chunk.line_range.0,
                end_line: chunk.line_range.1,
                content: chunk.code,
                vector,
            })
            .collect())
    }

    /// Replace the file's rows with `embedded`.
    pub(super) async fn write(
        conn: &mut SqliteConnection,
        tag: &Tag,
        file: &FileEntry,
        embedded: &[EmbeddedChunk],
    ) -> Result<ArtifactOutcome> {
        Self::remove(conn, tag, &file.path).await?;

        let key = tag.key();
        let path = path_key(&file.path);
        let mut failed = 0;
        for (idx, chunk) in embedded.iter().enumerate() {
            let status = if chunk.vector.is_some() {
                STATUS_OK
            } else {
                failed += 1;
                STATUS_FAILED
            };
            sqlx::query(
                "INSERT INTO embeddings (tag, path, chunk_idx, start_line, end_line, content, vector, status) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&key)
            .bind(&path)
            .bind(i64::try_from(idx)?)
            .bind(i64::try_from(chunk.start_line)?)
            .bind(i64::try_from(chunk.end_line)?)
            .bind(&chunk.content)
            .bind(chunk.vector.as_deref().map(vector_to_blob))
            .bind(status)
            .execute(&mut *conn)
            .await?;
        }

        tracing::debug!(
            path = %file.path.display(),
            chunks = embedded.len(),
            failed,
            "embedded"
        );
        Ok(ArtifactOutcome {
            records: embedded.len(),
            failed,
        })
    }

    pub(super) async fn remove(conn: &mut SqliteConnection, tag: &Tag, path: &Path) -> Result<()> {
        sqlx::query("DELETE FROM embeddings WHERE tag = ? AND path = ?")
            .bind(tag.key())
            .bind(path_key(path))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub(super) async fn clear(conn: &mut SqliteConnection, tag: &Tag) -> Result<u64> {
        let result = sqlx::query("DELETE FROM embeddings WHERE tag = ?")
            .bind(tag.key())
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Best `limit` chunks by cosine similarity to the embedded `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be embedded or the rows cannot be
    /// read.
    pub async fn retrieve(
        provider: &P,
        pool: &SqlitePool,
        tags: &[Tag],
        filter_directory: Option<&Path>,
        text: &str,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if tags.is_empty() || limit == 0 || text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query = provider.embed(text).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT path, start_line, end_line, content, vector FROM embeddings \
             WHERE status = 'ok' AND tag IN (",
        );
        let mut keys = qb.separated(", ");
        for tag in tags {
            keys.push_bind(tag.key());
        }
        qb.push(")");
        if let Some(dir) = filter_directory {
            let prefix = dir_prefix(dir);
            qb.push(" AND substr(path, 1, ");
            qb.push_bind(i64::try_from(prefix.chars().count())?);
            qb.push(") = ");
            qb.push_bind(prefix);
        }

        let rows: Vec<(String, i64, i64, String, Vec<u8>)> =
            qb.build_query_as().fetch_all(pool).await?;

        let mut scored = Vec::with_capacity(rows.len());
        for (filepath, start, end, content, blob) in rows {
            let vector = blob_to_vector(&blob);
            if vector.len() != query.len() {
                continue;
            }
            scored.push(RetrievalResult {
                score: cosine_similarity(&query, &vector),
                filepath,
                content,
                start_line: usize::try_from(start)?,
                end_line: usize::try_from(end)?,
                source: ArtifactKind::Embeddings,
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.filepath.cmp(&b.filepath))
                .then_with(|| a.start_line.cmp(&b.start_line))
        });
        scored.truncate(limit);
        Ok(scored)
    }
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
