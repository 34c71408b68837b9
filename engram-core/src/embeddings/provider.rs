//! Embedding provider trait.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Turns text into a fixed-dimension float vector.
///
/// Implementations must be idempotent: repeated calls with identical text
/// return semantically identical vectors, subject to provider determinism.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// The fixed output dimension of this provider.
    fn dimension(&self) -> usize;

    /// Provider identifier for logs and health reports.
    fn name(&self) -> &str;

    /// Check if the provider is reachable and configured.
    async fn is_available(&self) -> bool {
        self.embed("probe").await.is_ok()
    }
}

/// Validate that an embedding matches the expected dimension.
pub fn validate_dimension(embedding: &[f32], expected: usize) -> Result<()> {
    if embedding.len() != expected {
        return Err(Error::Provider {
            message: format!(
                "embedding dimension mismatch: got {}, expected {expected}",
                embedding.len()
            ),
            transient: false,
        });
    }
    Ok(())
}
