//! Test-only deterministic embeddings provider.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::LlmError;
use crate::provider::EmbeddingsProvider;

/// Hashes identifier-like tokens into a fixed number of buckets, so texts
/// sharing words get similar vectors.
#[derive(Debug, Clone)]
pub struct MockProvider {
    pub dimensions: usize,
    /// Any batch containing a text with this substring fails.
    pub fail_on: Option<String>,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
    calls: Arc<AtomicUsize>,
    texts: Arc<AtomicUsize>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            dimensions: 64,
            fail_on: None,
            delay_ms: 0,
            calls: Arc::new(AtomicUsize::new(0)),
            texts: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn failing_on(marker: impl Into<String>) -> Self {
        Self {
            fail_on: Some(marker.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Number of `embed_batch` calls made so far, shared across clones.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of texts embedded so far, shared across clones.
    #[must_use]
    pub fn texts_embedded(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions.max(1)];
        for token in text
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|t| !t.is_empty())
        {
            let bucket = (fnv1a(&token.to_lowercase()) % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl EmbeddingsProvider for MockProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.fail_on
            && texts.iter().any(|t| t.contains(marker.as_str()))
        {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vectors_are_deterministic_and_normalized() {
        let p = MockProvider::default();
        let a = p.embed("fn hello_world() {}").await.unwrap();
        let b = p.embed("fn hello_world() {}").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn fail_on_marker_fails_whole_batch() {
        let p = MockProvider::failing_on("BOOM");
        let err = p
            .embed_batch(&["ok".to_string(), "BOOM here".to_string()])
            .await;
        assert!(err.is_err());
        assert_eq!(p.texts_embedded(), 0);
        assert_eq!(p.calls(), 1);
    }

    #[tokio::test]
    async fn counters_shared_across_clones() {
        let p = MockProvider::default();
        let clone = p.clone();
        clone.embed_batch(&["a".into(), "b".into()]).await.unwrap();
        assert_eq!(p.texts_embedded(), 2);
    }
}
