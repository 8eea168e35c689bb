//! Embedder
//!
//! Wraps a fixed 384-dim text embedding model; produces vectors and reports
//! staleness when content diverges from its stored embedding (spec §2, §4.1
//! component table — 5% of the system). The model itself is an opaque
//! dependency (spec §1 "Out of scope"): this module defines the seam
//! ([`Embedder`]) and two implementations — [`fastembed_backend`] for real
//! inference, [`fixture`] for deterministic tests.

#[cfg(feature = "embeddings")]
pub mod fastembed_backend;
pub mod fixture;

use async_trait::async_trait;
use thiserror::Error;

use crate::EMBEDDING_DIMENSIONS;

#[derive(Debug, Error)]
pub enum EmbedderError {
    #[error("embedding model initialization failed: {0}")]
    Init(String),
    #[error("embedding inference failed: {0}")]
    Inference(String),
}

pub type Result<T> = std::result::Result<T, EmbedderError>;

/// A fixed-width text embedder. Implementations must always return vectors
/// of exactly [`EMBEDDING_DIMENSIONS`] length.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch form; the default just loops, real backends should override
    /// for throughput.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }
}

#[async_trait]
impl Embedder for Box<dyn Embedder> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts).await
    }
}

/// Cosine similarity between two vectors. Returns 0.0 on a dimension
/// mismatch rather than panicking — callers treat a mismatched/missing
/// vector as "vector signal cannot fire" (spec §4.2 "Failure and
/// observability"), never as an error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = (norm_a * norm_b).sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

/// Sanity check used at ingestion and migration time (invariant 7).
pub fn is_valid_embedding(v: &[f32]) -> bool {
    v.len() == EMBEDDING_DIMENSIONS
}

/// Wraps any [`Embedder`] with an LRU cache keyed by content hash, so
/// repeated `get_context` calls on the same message (common with chat UIs
/// that resend the latest turn) skip re-running inference.
pub struct CachingEmbedder<E: Embedder> {
    inner: E,
    cache: parking_lot::Mutex<lru::LruCache<blake3::Hash, Vec<f32>>>,
}

impl<E: Embedder> CachingEmbedder<E> {
    pub fn new(inner: E, capacity: std::num::NonZeroUsize) -> Self {
        Self {
            inner,
            cache: parking_lot::Mutex::new(lru::LruCache::new(capacity)),
        }
    }
}

#[async_trait]
impl<E: Embedder> Embedder for CachingEmbedder<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = blake3::hash(text.as_bytes());
        if let Some(cached) = self.cache.lock().get(&key) {
            return Ok(cached.clone());
        }
        let vector = self.inner.embed(text).await?;
        self.cache.lock().put(key, vector.clone());
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![0.1, 0.2, 0.3, 0.4];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_mismatched_dims_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }
}
