//! Deterministic hash-based embedder.
//!
//! Projects token hashes into a fixed-dimension vector. Not semantically
//! meaningful the way a learned model is, but deterministic, dependency-free
//! and cheap, which makes it both the offline default and the degraded-mode
//! fallback. Identical texts always produce identical vectors.

use async_trait::async_trait;
use std::hash::{DefaultHasher, Hash, Hasher};

use super::provider::EmbeddingProvider;
use super::similarity::normalize_vector;
use crate::error::Result;

/// Name reported by the hash embedder.
pub const HASH_EMBEDDER_NAME: &str = "hash-embedder-v1";

/// Deterministic lightweight embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Synchronous embedding, used directly by the fallback path.
    #[must_use]
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for (position, token) in tokenize(text).enumerate() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let token_hash = hasher.finish();

            // Two buckets per token: one positional, one bag-of-words, so
            // both word identity and rough order shape the vector.
            let bag_index = (token_hash % self.dimension as u64) as usize;
            let sign = if token_hash & 1 == 0 { 1.0 } else { -1.0 };
            vector[bag_index] += sign;

            let mut positional = DefaultHasher::new();
            (token, position / 4).hash(&mut positional);
            let pos_hash = positional.finish();
            let pos_index = (pos_hash % self.dimension as u64) as usize;
            vector[pos_index] += if pos_hash & 2 == 0 { 0.5 } else { -0.5 };
        }
        normalize_vector(vector)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        HASH_EMBEDDER_NAME
    }

    async fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::similarity::cosine_similarity;

    #[tokio::test]
    async fn deterministic_for_identical_text() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("use connection pooling").await.expect("embed");
        let b = embedder.embed("use connection pooling").await.expect("embed");
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn output_has_requested_dimension_and_unit_norm() {
        let embedder = HashEmbedder::new(128);
        let v = embedder.embed("database pooling").await.expect("embed");
        assert_eq!(v.len(), 128);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_words_raise_similarity() {
        let embedder = HashEmbedder::new(256);
        let pooling = embedder
            .embed("use connection pooling for the database")
            .await
            .expect("embed");
        let near = embedder
            .embed("database connection pooling")
            .await
            .expect("embed");
        let far = embedder
            .embed("render the navigation sidebar component")
            .await
            .expect("embed");
        assert!(cosine_similarity(&pooling, &near) > cosine_similarity(&pooling, &far));
    }
}
