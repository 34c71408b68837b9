//! Reliability substrate around the external dependencies: bounded retry,
//! sliding-window circuit breakers, and deadline-bounded connection pools,
//! all handed out by a process-wide [`ReliabilityManager`].

pub mod circuit_breaker;
pub mod pool;
pub mod retry;

pub use circuit_breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use pool::{ConnectionPool, PoolStatistics, PooledConnection};
pub use retry::{RetryConfig, RetryPolicy, Retryable};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::ReliabilitySettings;
use crate::error::{Error, Result};

/// External dependencies the substrate guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    Embedding,
    VectorStore,
    Metadata,
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dependency::Embedding => write!(f, "embedding"),
            Dependency::VectorStore => write!(f, "vector_store"),
            Dependency::Metadata => write!(f, "metadata"),
        }
    }
}

/// Process-wide holder of breaker and retry state.
///
/// Operations obtain handles through this manager instead of touching
/// globals; tests construct a fresh manager per case. `teardown` flips the
/// manager into a rejecting state so in-flight work drains without new
/// admissions.
pub struct ReliabilityManager {
    embedding_breaker: Arc<CircuitBreaker>,
    vector_breaker: Arc<CircuitBreaker>,
    metadata_breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
    shut_down: AtomicBool,
}

impl ReliabilityManager {
    #[must_use]
    pub fn new(settings: &ReliabilitySettings) -> Self {
        let breaker_config = BreakerConfig {
            window: settings.breaker.window,
            threshold: settings.breaker.threshold,
            cooldown: Duration::from_secs(settings.breaker.cooldown_secs),
            ..BreakerConfig::default()
        };
        Self {
            embedding_breaker: Arc::new(CircuitBreaker::new(breaker_config.clone())),
            vector_breaker: Arc::new(CircuitBreaker::new(breaker_config.clone())),
            metadata_breaker: Arc::new(CircuitBreaker::new(breaker_config)),
            retry: RetryConfig::from(&settings.retry),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Breaker handle for one dependency.
    #[must_use]
    pub fn breaker(&self, dependency: Dependency) -> Arc<CircuitBreaker> {
        match dependency {
            Dependency::Embedding => Arc::clone(&self.embedding_breaker),
            Dependency::VectorStore => Arc::clone(&self.vector_breaker),
            Dependency::Metadata => Arc::clone(&self.metadata_breaker),
        }
    }

    /// A fresh retry policy configured from the shared settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_config(self.retry.clone())
    }

    /// The shared retry configuration, for wrappers that own their policy.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        self.retry.clone()
    }

    /// Admission control: refuse new work while shut down or while any
    /// breaker is rejecting outright (open and still cooling down).
    pub fn admit(&self) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(Error::Unavailable {
                dependency: "service".into(),
                reason: "shutting down".into(),
            });
        }
        for (dependency, breaker) in [
            (Dependency::Embedding, &self.embedding_breaker),
            (Dependency::VectorStore, &self.vector_breaker),
            (Dependency::Metadata, &self.metadata_breaker),
        ] {
            if breaker.is_rejecting() {
                return Err(Error::Unavailable {
                    dependency: dependency.to_string(),
                    reason: "circuit breaker open".into(),
                });
            }
        }
        Ok(())
    }

    /// True once all breakers sit closed.
    #[must_use]
    pub fn all_closed(&self) -> bool {
        [
            &self.embedding_breaker,
            &self.vector_breaker,
            &self.metadata_breaker,
        ]
        .iter()
        .all(|b| b.state() == BreakerState::Closed)
    }

    /// Stop admitting new work.
    pub fn teardown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_rejects_after_teardown() {
        let manager = ReliabilityManager::new(&ReliabilitySettings::default());
        assert!(manager.admit().is_ok());
        manager.teardown();
        let err = manager.admit().expect_err("rejected");
        assert_eq!(err.code(), "unavailable");
    }

    #[test]
    fn admit_rejects_while_a_breaker_cools_down() {
        let manager = ReliabilityManager::new(&ReliabilitySettings::default());
        let breaker = manager.breaker(Dependency::Embedding);
        for _ in 0..10 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(manager.admit().is_err());
    }
}
