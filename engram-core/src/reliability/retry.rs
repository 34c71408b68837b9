//! Bounded exponential backoff with jitter.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::config::RetrySettings;

/// Errors that can tell the policy whether another attempt makes sense.
pub trait Retryable {
    fn is_recoverable(&self) -> bool;
}

impl Retryable for crate::error::Error {
    fn is_recoverable(&self) -> bool {
        self.is_recoverable()
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub factor: u32,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            factor: 2,
            jitter_factor: 0.25,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            factor: settings.factor,
            ..Self::default()
        }
    }
}

pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(config: RetryConfig) -> Self {
        Self { config }
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exp_delay =
            self.config.base_delay * self.config.factor.saturating_pow(attempt.saturating_sub(1));
        let delay = std::cmp::min(exp_delay, self.config.max_delay);

        if self.config.jitter_factor > 0.0 {
            let jitter_range = delay.as_millis() as f64 * self.config.jitter_factor;
            let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
            let adjusted_ms = (delay.as_millis() as f64 + jitter).max(0.0);
            Duration::from_millis(adjusted_ms as u64)
        } else {
            delay
        }
    }

    /// Run `operation`, retrying recoverable failures up to the bound.
    pub async fn execute<F, T, E, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Debug,
    {
        let mut attempt: u32 = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_recoverable() || attempt >= self.config.max_attempts {
                        return Err(e);
                    }

                    let delay = self.calculate_delay(attempt);
                    warn!(
                        "attempt {}/{} failed: {:?}, retrying in {:?}",
                        attempt, self.config.max_attempts, e, delay
                    );
                    attempt += 1;
                    sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::with_config(RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            factor: 2,
            jitter_factor: 0.0,
        })
    }

    #[tokio::test]
    async fn retries_recoverable_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, Error> = fast_policy(3)
            .execute(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Error::Storage("transient".into()))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.expect("succeeds on third attempt"), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = fast_policy(3)
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Storage("still down".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = fast_policy(3)
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Provider {
                    message: "invalid api key".into(),
                    transient: false,
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_grows_by_factor_and_caps() {
        let policy = RetryPolicy::with_config(RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            factor: 2,
            jitter_factor: 0.0,
        });
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(350));
    }
}
