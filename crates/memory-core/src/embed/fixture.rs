//! A deterministic, hash-based embedder used in tests and whenever the
//! `embeddings` feature is disabled. Not semantically meaningful — it
//! exists so Retrieval Engine and Store tests can exercise the vector
//! signal without downloading a real model.

use async_trait::async_trait;

use super::{Embedder, Result};
use crate::EMBEDDING_DIMENSIONS;

#[derive(Debug, Default)]
pub struct FixtureEmbedder;

#[async_trait]
impl Embedder for FixtureEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(hash_embed(text))
    }
}

/// Deterministic pseudo-embedding: hash overlapping trigrams of the
/// lowercased text into `EMBEDDING_DIMENSIONS` buckets. Similar strings
/// land on overlapping buckets, giving a crude but deterministic and
/// dependency-free stand-in for semantic similarity in tests.
fn hash_embed(text: &str) -> Vec<f32> {
    let mut buckets = vec![0.0f32; EMBEDDING_DIMENSIONS];
    let normalized = text.to_lowercase();
    let chars: Vec<char> = normalized.chars().collect();

    if chars.is_empty() {
        return buckets;
    }

    let window = 3.min(chars.len());
    for i in 0..=(chars.len() - window) {
        let gram: String = chars[i..i + window].iter().collect();
        let hash = blake3::hash(gram.as_bytes());
        let bytes = hash.as_bytes();
        let idx = (u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
            % EMBEDDING_DIMENSIONS;
        buckets[idx] += 1.0;
    }

    let norm = buckets.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for b in &mut buckets {
            *b /= norm;
        }
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embeds_to_fixed_width() {
        let e = FixtureEmbedder;
        let v = e.embed("debugging retrieval precision").await.unwrap();
        assert_eq!(v.len(), EMBEDDING_DIMENSIONS);
    }

    #[tokio::test]
    async fn similar_text_is_more_similar_than_unrelated_text() {
        let e = FixtureEmbedder;
        let a = e.embed("debugging the retrieval gatekeeper").await.unwrap();
        let b = e.embed("debugging the retrieval precision gate").await.unwrap();
        let c = e.embed("a recipe for chocolate chip cookies").await.unwrap();

        let sim_ab = super::super::cosine_similarity(&a, &b);
        let sim_ac = super::super::cosine_similarity(&a, &c);
        assert!(sim_ab > sim_ac);
    }
}
