use crate::error::LlmError;

/// Produces embedding vectors for text.
///
/// Implementations must return exactly one vector per input text, in input
/// order. Batching limits are the caller's concern.
pub trait EmbeddingsProvider: Send + Sync {
    /// Embed a batch of texts.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable, rejects the request, or
    /// returns a different number of vectors than texts.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send;

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Same as [`EmbeddingsProvider::embed_batch`].
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send {
        let batch = vec![text.to_owned()];
        async move {
            let provider = self.name();
            let mut vectors = self.embed_batch(&batch).await?;
            vectors.pop().ok_or(LlmError::EmptyResponse { provider })
        }
    }

    fn name(&self) -> &'static str;
}

/// Check a backend response against the request size.
pub(crate) fn check_batch(
    provider: &'static str,
    expected: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>, LlmError> {
    if vectors.len() == expected {
        Ok(vectors)
    } else {
        Err(LlmError::BatchMismatch {
            provider,
            expected,
            got: vectors.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_batch_accepts_matching_length() {
        let vectors = check_batch("test", 2, vec![vec![1.0], vec![2.0]]).unwrap();
        assert_eq!(vectors.len(), 2);
    }

    #[test]
    fn check_batch_rejects_short_response() {
        let err = check_batch("test", 3, vec![vec![1.0]]).unwrap_err();
        assert!(err.to_string().contains("returned 1 embeddings for a batch of 3"));
    }
}
