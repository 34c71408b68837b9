//! Scripted mock provider for tests.
//!
//! Produces the same deterministic vectors as the hash embedder, with a
//! failure script so reliability behaviour (retry, breaker trips, fallback)
//! can be driven precisely.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use super::hash::HashEmbedder;
use super::provider::EmbeddingProvider;
use crate::error::{Error, Result};

/// A failure the mock should inject before succeeding again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// Timeout/5xx-style failure, retried by the policy
    Transient,
    /// Invalid-key-style failure, never retried
    Permanent,
}

/// Deterministic provider with scripted failures.
pub struct MockProvider {
    inner: HashEmbedder,
    script: Mutex<VecDeque<ScriptedFailure>>,
    calls: AtomicU64,
}

impl MockProvider {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: HashEmbedder::new(dimension),
            script: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Queue `count` failures of the given kind before the next success.
    pub fn fail_next(&self, count: usize, failure: ScriptedFailure) {
        let mut script = self.script.lock();
        for _ in 0..count {
            script.push_back(failure);
        }
    }

    /// Total embed calls observed, including failed ones.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(ScriptedFailure::Transient) => Err(Error::Provider {
                message: "scripted transient failure".into(),
                transient: true,
            }),
            Some(ScriptedFailure::Permanent) => Err(Error::Provider {
                message: "scripted permanent failure".into(),
                transient: false,
            }),
            None => Ok(self.inner.embed_sync(text)),
        }
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        "mock-embedder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failures_drain_in_order() {
        let provider = MockProvider::new(8);
        provider.fail_next(2, ScriptedFailure::Transient);

        assert!(provider.embed("a").await.is_err());
        assert!(provider.embed("a").await.is_err());
        assert!(provider.embed("a").await.is_ok());
        assert_eq!(provider.calls(), 3);
    }
}
