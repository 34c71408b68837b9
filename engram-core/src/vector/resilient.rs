//! Reliability-wrapped vector store client.
//!
//! Every operation checks the shared circuit breaker, checks out a pooled
//! transport lease, and retries transient failures with the shared policy.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use super::filter::Filter;
use super::{Hit, VectorMetadata, VectorStore};
use crate::config::VectorStoreSettings;
use crate::error::{Error, Result};
use crate::health::ComponentHealth;
use crate::reliability::{CircuitBreaker, ConnectionPool, RetryConfig, RetryPolicy};

/// Circuit-broken, pooled, retrying wrapper over any [`VectorStore`].
pub struct ResilientVectorStore {
    inner: Arc<dyn VectorStore>,
    pool: ConnectionPool<Arc<dyn VectorStore>>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
}

impl ResilientVectorStore {
    pub fn new(
        inner: Arc<dyn VectorStore>,
        settings: &VectorStoreSettings,
        breaker: Arc<CircuitBreaker>,
        retry: RetryConfig,
    ) -> Self {
        let factory_inner = Arc::clone(&inner);
        let pool = ConnectionPool::new(
            "vector_store",
            settings.pool_size,
            settings.acquire_timeout(),
            move || Ok(Arc::clone(&factory_inner)),
        );
        Self {
            inner,
            pool,
            breaker,
            retry,
        }
    }

    /// True when every pooled transport is checked out.
    #[must_use]
    pub fn is_saturated(&self) -> bool {
        self.pool.is_saturated()
    }

    async fn guarded<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn(Arc<dyn VectorStore>) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if self.breaker.allow_request().is_err() {
            return Err(Error::Unavailable {
                dependency: "vector_store".into(),
                reason: "circuit breaker open".into(),
            });
        }

        let lease = self.pool.acquire().await?;
        let store = Arc::clone(lease.get());

        let policy = RetryPolicy::with_config(self.retry.clone());
        let result = policy
            .execute(|| {
                let store = Arc::clone(&store);
                let operation = &operation;
                async move {
                    match operation(Arc::clone(&store)).await {
                        Ok(value) => {
                            self.breaker.record_success();
                            Ok(value)
                        }
                        Err(e) => {
                            self.breaker.record_failure();
                            Err(e)
                        }
                    }
                }
            })
            .await;

        result.map_err(|e| {
            if e.is_recoverable() {
                Error::Unavailable {
                    dependency: "vector_store".into(),
                    reason: e.to_string(),
                }
            } else {
                e
            }
        })
    }

    /// Dependency health for the aggregate report.
    pub async fn check(&self, deadline: std::time::Duration) -> ComponentHealth {
        if self.breaker.is_rejecting() {
            return ComponentHealth::Unhealthy;
        }
        match tokio::time::timeout(deadline, self.inner.ping()).await {
            Ok(Ok(())) => ComponentHealth::Healthy,
            Ok(Err(_)) => ComponentHealth::Unhealthy,
            Err(_) => ComponentHealth::Degraded,
        }
    }
}

#[async_trait]
impl VectorStore for ResilientVectorStore {
    async fn upsert(&self, id: Uuid, vector: Vec<f32>, metadata: VectorMetadata) -> Result<()> {
        self.guarded(|store| {
            let vector = vector.clone();
            let metadata = metadata.clone();
            async move { store.upsert(id, vector, metadata).await }
        })
        .await
    }

    async fn query(&self, vector: &[f32], filter: &Filter, k: usize) -> Result<Vec<Hit>> {
        self.guarded(|store| {
            let vector = vector.to_vec();
            let filter = filter.clone();
            async move { store.query(&vector, &filter, k).await }
        })
        .await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        self.guarded(|store| async move { store.delete(id).await })
            .await
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<(Vec<f32>, VectorMetadata)>> {
        self.guarded(|store| async move { store.fetch(id).await })
            .await
    }

    async fn count(&self, project_id: &str) -> Result<usize> {
        self.guarded(|store| {
            let project_id = project_id.to_string();
            async move { store.count(&project_id).await }
        })
        .await
    }

    async fn list(&self, project_id: &str) -> Result<Vec<Uuid>> {
        self.guarded(|store| {
            let project_id = project_id.to_string();
            async move { store.list(&project_id).await }
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}
