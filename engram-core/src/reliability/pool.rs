//! Deadline-bounded connection pool.
//!
//! Concurrency is limited by a semaphore; acquiring a connection may block
//! up to the configured deadline, after which the call fails with
//! `PoolExhausted`. Resources are created per checkout by the supplied
//! factory, so the pool stays agnostic of transport specifics.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{Error, Result};

/// Pool counters for monitoring.
#[derive(Debug, Clone, Default)]
pub struct PoolStatistics {
    pub total_checkouts: usize,
    pub active_connections: usize,
    pub total_wait_time_ms: u64,
    pub timeouts: usize,
}

/// A checked-out resource; returns its permit on drop.
#[derive(Debug)]
pub struct PooledConnection<T> {
    resource: T,
    _permit: OwnedSemaphorePermit,
    stats: Arc<RwLock<PoolStatistics>>,
}

impl<T> PooledConnection<T> {
    pub fn get(&self) -> &T {
        &self.resource
    }
}

impl<T> Drop for PooledConnection<T> {
    fn drop(&mut self) {
        let mut stats = self.stats.write();
        if stats.active_connections > 0 {
            stats.active_connections -= 1;
        }
    }
}

/// Semaphore-bounded pool over a connection factory.
pub struct ConnectionPool<T> {
    name: String,
    semaphore: Arc<Semaphore>,
    acquire_timeout: Duration,
    capacity: usize,
    stats: Arc<RwLock<PoolStatistics>>,
    factory: Arc<dyn Fn() -> Result<T> + Send + Sync>,
}

impl<T> ConnectionPool<T> {
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        acquire_timeout: Duration,
        factory: impl Fn() -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            semaphore: Arc::new(Semaphore::new(capacity)),
            acquire_timeout,
            capacity,
            stats: Arc::new(RwLock::new(PoolStatistics::default())),
            factory: Arc::new(factory),
        }
    }

    /// Acquire a connection, blocking up to the configured deadline.
    pub async fn acquire(&self) -> Result<PooledConnection<T>> {
        let started = Instant::now();
        let permit = match tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(Error::internal(format!(
                    "pool '{}' semaphore closed",
                    self.name
                )));
            }
            Err(_) => {
                self.stats.write().timeouts += 1;
                return Err(Error::PoolExhausted(self.name.clone()));
            }
        };

        let resource = (self.factory)()?;
        let wait_ms = started.elapsed().as_millis() as u64;
        {
            let mut stats = self.stats.write();
            stats.total_checkouts += 1;
            stats.active_connections += 1;
            stats.total_wait_time_ms += wait_ms;
        }
        debug!(pool = %self.name, wait_ms, "connection checked out");

        Ok(PooledConnection {
            resource,
            _permit: permit,
            stats: Arc::clone(&self.stats),
        })
    }

    #[must_use]
    pub fn statistics(&self) -> PoolStatistics {
        self.stats.read().clone()
    }

    /// True when every permit is checked out.
    #[must_use]
    pub fn is_saturated(&self) -> bool {
        self.semaphore.available_permits() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(capacity: usize, timeout_ms: u64) -> ConnectionPool<u32> {
        ConnectionPool::new(
            "test",
            capacity,
            Duration::from_millis(timeout_ms),
            || Ok(7),
        )
    }

    #[tokio::test]
    async fn checkout_and_return() {
        let pool = pool(2, 100);
        {
            let conn = pool.acquire().await.expect("acquire");
            assert_eq!(*conn.get(), 7);
            assert_eq!(pool.statistics().active_connections, 1);
        }
        assert_eq!(pool.statistics().active_connections, 0);
    }

    #[tokio::test]
    async fn exhaustion_fails_with_pool_exhausted() {
        let pool = pool(1, 20);
        let _held = pool.acquire().await.expect("first acquire");
        assert!(pool.is_saturated());

        let err = pool.acquire().await.expect_err("second acquire times out");
        assert_eq!(err.code(), "pool_exhausted");
        assert_eq!(pool.statistics().timeouts, 1);
    }

    #[tokio::test]
    async fn waiting_caller_proceeds_once_released() {
        let pool = Arc::new(pool(1, 500));
        let held = pool.acquire().await.expect("first acquire");

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await.map(|c| *c.get()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        let value = waiter.await.expect("join").expect("acquire");
        assert_eq!(value, 7);
    }
}
