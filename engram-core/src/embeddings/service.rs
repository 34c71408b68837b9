//! Fault-tolerant embedding service.
//!
//! Composes the configured provider with the bounded cache, per-call
//! breaker accounting, bounded retry, and the deterministic fallback
//! embedder that takes over once the circuit has been open beyond the
//! grace period. Fallback responses are tagged so retrieval can
//! deprioritize them; they are never cached.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::cache::EmbeddingCache;
use super::hash::HashEmbedder;
use super::mock::MockProvider;
use super::provider::{EmbeddingProvider, validate_dimension};
use crate::config::{EmbeddingSettings, ProviderKind};
use crate::error::{Error, Result};
use crate::health::ComponentHealth;
use crate::reliability::{CircuitBreaker, RetryConfig, RetryPolicy};
use crate::types::Provenance;

/// An embedding plus where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedded {
    pub vector: Vec<f32>,
    pub provenance: Provenance,
}

/// Embedding client with caching, retry, circuit breaking and fallback.
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    fallback: HashEmbedder,
    cache: EmbeddingCache,
    breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
    fallback_grace: Duration,
    dimension: usize,
}

impl EmbeddingService {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        settings: &EmbeddingSettings,
        breaker: Arc<CircuitBreaker>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            fallback: HashEmbedder::new(settings.dimension),
            cache: EmbeddingCache::new(settings.cache_capacity),
            breaker,
            retry,
            fallback_grace: Duration::from_secs(settings.fallback_grace_secs),
            dimension: settings.dimension,
            provider,
        }
    }

    /// Build the provider selected by configuration.
    ///
    /// Without the `remote-embeddings` feature the primary backend is the
    /// deterministic hash embedder, which keeps the service fully offline.
    pub fn from_settings(
        settings: &EmbeddingSettings,
        breaker: Arc<CircuitBreaker>,
        retry: RetryConfig,
    ) -> Self {
        let provider: Arc<dyn EmbeddingProvider> = match settings.provider {
            ProviderKind::Primary | ProviderKind::Fallback => {
                Arc::new(HashEmbedder::new(settings.dimension))
            }
            ProviderKind::Mock => Arc::new(MockProvider::new(settings.dimension)),
        };
        Self::new(provider, settings, breaker, retry)
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Embed `text`, absorbing transient provider failures.
    ///
    /// Returns `Unavailable` once retry and breaker budgets are exhausted
    /// and the open-circuit grace period has not yet elapsed.
    pub async fn embed(&self, text: &str) -> Result<Arc<Embedded>> {
        if let Some(cached) = self.cache.get(text) {
            return Ok(cached);
        }

        if self.breaker.allow_request().is_err() {
            return self.short_circuit(text);
        }

        let policy = RetryPolicy::with_config(self.retry.clone());
        let attempt = policy
            .execute(|| async {
                self.breaker
                    .allow_request()
                    .map_err(|_| Error::Unavailable {
                        dependency: "embedding".into(),
                        reason: "circuit breaker open".into(),
                    })?;
                match self.provider.embed(text).await {
                    Ok(vector) => {
                        self.breaker.record_success();
                        Ok(vector)
                    }
                    Err(e) => {
                        self.breaker.record_failure();
                        Err(e)
                    }
                }
            })
            .await;

        match attempt {
            Ok(vector) => {
                validate_dimension(&vector, self.dimension)?;
                let embedded = Arc::new(Embedded {
                    vector,
                    provenance: Provenance::Primary,
                });
                self.cache.put(text, Arc::clone(&embedded));
                Ok(embedded)
            }
            Err(Error::Unavailable { .. }) => self.short_circuit(text),
            Err(e) => {
                tracing::warn!(error = %e, "embedding provider exhausted retries");
                Err(Error::Unavailable {
                    dependency: "embedding".into(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Open-circuit path: fallback after the grace period, error before it.
    fn short_circuit(&self, text: &str) -> Result<Arc<Embedded>> {
        let open_for = self.breaker.open_for().unwrap_or_default();
        if open_for >= self.fallback_grace {
            tracing::debug!("serving fallback embedding while circuit is open");
            return Ok(Arc::new(Embedded {
                vector: self.fallback.embed_sync(text),
                provenance: Provenance::Fallback,
            }));
        }
        Err(Error::Unavailable {
            dependency: "embedding".into(),
            reason: "circuit breaker open".into(),
        })
    }

    /// Dependency health for the aggregate report.
    pub async fn check(&self, deadline: Duration) -> ComponentHealth {
        if self.breaker.is_rejecting() {
            return ComponentHealth::Unhealthy;
        }
        match tokio::time::timeout(deadline, self.provider.is_available()).await {
            Ok(true) => ComponentHealth::Healthy,
            Ok(false) => ComponentHealth::Unhealthy,
            Err(_) => ComponentHealth::Degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::mock::ScriptedFailure;
    use crate::reliability::{BreakerConfig, BreakerState};

    fn service_with(
        provider: Arc<MockProvider>,
        grace_secs: u64,
        cooldown: Duration,
    ) -> (EmbeddingService, Arc<CircuitBreaker>) {
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
            window: 10,
            threshold: 0.5,
            cooldown,
            ..BreakerConfig::default()
        }));
        let settings = EmbeddingSettings {
            dimension: 8,
            cache_capacity: 16,
            fallback_grace_secs: grace_secs,
            ..EmbeddingSettings::default()
        };
        let retry = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            factor: 2,
            jitter_factor: 0.0,
        };
        let service = EmbeddingService::new(provider, &settings, Arc::clone(&breaker), retry);
        (service, breaker)
    }

    #[tokio::test]
    async fn cache_prevents_repeat_provider_calls() {
        let provider = Arc::new(MockProvider::new(8));
        let (service, _) = service_with(Arc::clone(&provider), 60, Duration::from_secs(30));

        let first = service.embed("database pooling").await.expect("embed");
        let second = service.embed("database pooling").await.expect("embed");
        assert_eq!(first.vector, second.vector);
        assert_eq!(provider.calls(), 1);
        assert_eq!(service.cache().metrics().hits(), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_to_success() {
        let provider = Arc::new(MockProvider::new(8));
        provider.fail_next(2, ScriptedFailure::Transient);
        let (service, breaker) = service_with(Arc::clone(&provider), 60, Duration::from_secs(30));

        let embedded = service.embed("retry me").await.expect("embed");
        assert_eq!(embedded.provenance, Provenance::Primary);
        assert_eq!(provider.calls(), 3);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let provider = Arc::new(MockProvider::new(8));
        provider.fail_next(1, ScriptedFailure::Permanent);
        let (service, _) = service_with(Arc::clone(&provider), 60, Duration::from_secs(30));

        let err = service.embed("bad key").await.expect_err("fails");
        assert_eq!(err.code(), "unavailable");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn open_breaker_short_circuits_within_grace() {
        let provider = Arc::new(MockProvider::new(8));
        provider.fail_next(12, ScriptedFailure::Transient);
        let (service, breaker) = service_with(Arc::clone(&provider), 3600, Duration::from_secs(30));

        // Drive the breaker open: distinct texts bypass the cache.
        for i in 0..2 {
            let _ = service.embed(&format!("text {i}")).await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        let calls_before = provider.calls();
        let err = service.embed("while open").await.expect_err("short circuit");
        assert_eq!(err.code(), "unavailable");
        // No provider attempt while the circuit rejects.
        assert_eq!(provider.calls(), calls_before);
    }

    #[tokio::test]
    async fn fallback_serves_after_grace_with_provenance() {
        let provider = Arc::new(MockProvider::new(8));
        provider.fail_next(12, ScriptedFailure::Transient);
        // Grace of zero: fallback engages as soon as the circuit opens.
        let (service, breaker) = service_with(Arc::clone(&provider), 0, Duration::from_secs(3600));

        for i in 0..2 {
            let _ = service.embed(&format!("text {i}")).await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        let embedded = service.embed("degraded query").await.expect("fallback");
        assert_eq!(embedded.provenance, Provenance::Fallback);
        assert_eq!(embedded.vector.len(), 8);
    }
}
