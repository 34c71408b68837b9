//! Sliding-window circuit breaker.
//!
//! Outcomes of the most recent `window` calls are kept in a ring; the
//! breaker opens once the failure count in that window reaches
//! `ceil(threshold * window)`. Open circuits short-circuit to error for a
//! cool-down, then admit a limited number of half-open probes before
//! closing again.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Sliding window size, in calls
    pub window: usize,
    /// Failure ratio over the window that trips the breaker
    pub threshold: f64,
    /// How long an open circuit rejects before probing
    pub cooldown: Duration,
    /// Consecutive half-open successes required to close
    pub success_threshold: u32,
    /// Maximum probes admitted while half-open
    pub half_open_max_attempts: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window: 10,
            threshold: 0.5,
            cooldown: Duration::from_secs(30),
            success_threshold: 1,
            half_open_max_attempts: 3,
        }
    }
}

impl BreakerConfig {
    /// Failures within the window that trip the breaker.
    #[must_use]
    pub fn trip_count(&self) -> usize {
        let raw = (self.threshold * self.window as f64).ceil() as usize;
        raw.clamp(1, self.window)
    }
}

#[derive(Debug)]
enum State {
    Closed { outcomes: VecDeque<bool> },
    Open { opened_at: Instant },
    HalfOpen { attempts: u32, successes: u32 },
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Error when the circuit rejects a request.
#[derive(Debug, thiserror::Error)]
#[error("circuit breaker is open - dependency unavailable")]
pub struct CircuitOpenError;

/// Counter-and-state machine guarding one dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<State>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            state: Mutex::new(State::Closed {
                outcomes: VecDeque::new(),
            }),
            config,
        }
    }

    /// Check whether a request may proceed, transitioning open circuits to
    /// half-open once the cool-down has elapsed.
    pub fn allow_request(&self) -> Result<(), CircuitOpenError> {
        let mut state = self.state.lock();
        match *state {
            State::Closed { .. } => Ok(()),
            State::Open { opened_at } => {
                if opened_at.elapsed() >= self.config.cooldown {
                    tracing::info!("circuit breaker transitioning to half-open");
                    *state = State::HalfOpen {
                        attempts: 1,
                        successes: 0,
                    };
                    Ok(())
                } else {
                    Err(CircuitOpenError)
                }
            }
            State::HalfOpen {
                attempts,
                successes,
            } => {
                if attempts < self.config.half_open_max_attempts {
                    *state = State::HalfOpen {
                        attempts: attempts + 1,
                        successes,
                    };
                    Ok(())
                } else {
                    Err(CircuitOpenError)
                }
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        match &mut *state {
            State::Closed { outcomes } => {
                Self::push_outcome(outcomes, self.config.window, true);
            }
            State::HalfOpen {
                attempts,
                successes,
            } => {
                let new_successes = *successes + 1;
                if new_successes >= self.config.success_threshold {
                    tracing::info!("circuit breaker closing - recovery successful");
                    *state = State::Closed {
                        outcomes: VecDeque::new(),
                    };
                } else {
                    *state = State::HalfOpen {
                        attempts: *attempts,
                        successes: new_successes,
                    };
                }
            }
            State::Open { .. } => {
                tracing::warn!("received success while circuit is open");
            }
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        match &mut *state {
            State::Closed { outcomes } => {
                Self::push_outcome(outcomes, self.config.window, false);
                let failures = outcomes.iter().filter(|ok| !**ok).count();
                if failures >= self.config.trip_count() {
                    tracing::warn!(
                        failures,
                        window = self.config.window,
                        "circuit breaker opening"
                    );
                    *state = State::Open {
                        opened_at: Instant::now(),
                    };
                }
            }
            State::HalfOpen { .. } => {
                tracing::warn!("circuit breaker reopening - probe failed");
                *state = State::Open {
                    opened_at: Instant::now(),
                };
            }
            State::Open { .. } => {}
        }
    }

    fn push_outcome(outcomes: &mut VecDeque<bool>, window: usize, ok: bool) {
        outcomes.push_back(ok);
        while outcomes.len() > window {
            outcomes.pop_front();
        }
    }

    /// Current observable state.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        match *self.state.lock() {
            State::Closed { .. } => BreakerState::Closed,
            State::Open { .. } => BreakerState::Open,
            State::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    /// How long the circuit has been open, if it is.
    #[must_use]
    pub fn open_for(&self) -> Option<Duration> {
        match *self.state.lock() {
            State::Open { opened_at } => Some(opened_at.elapsed()),
            _ => None,
        }
    }

    /// True while the circuit rejects without probing: open and still
    /// inside the cool-down. Does not transition state.
    #[must_use]
    pub fn is_rejecting(&self) -> bool {
        match *self.state.lock() {
            State::Open { opened_at } => opened_at.elapsed() < self.config.cooldown,
            _ => false,
        }
    }

    /// Force the breaker back to closed.
    pub fn reset(&self) {
        *self.state.lock() = State::Closed {
            outcomes: VecDeque::new(),
        };
        tracing::info!("circuit breaker manually reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(window: usize, threshold: f64, cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            window,
            threshold,
            cooldown,
            ..BreakerConfig::default()
        })
    }

    #[test]
    fn starts_closed() {
        let cb = breaker(10, 0.5, Duration::from_secs(30));
        assert!(cb.allow_request().is_ok());
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn trips_at_exactly_the_configured_count() {
        // window 10, threshold 0.5 -> trips at 5 failures, not 4
        let cb = breaker(10, 0.5, Duration::from_secs(30));
        for _ in 0..4 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), BreakerState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(cb.allow_request().is_err());
    }

    #[test]
    fn mixed_outcomes_trip_on_window_ratio() {
        // 6 failures among 10 calls crosses a 0.5 ratio
        let cb = breaker(10, 0.5, Duration::from_secs(30));
        for i in 0..10 {
            if i % 2 == 0 {
                cb.record_success();
            } else {
                cb.record_failure();
            }
            assert_eq!(cb.state(), BreakerState::Closed, "at call {i}");
        }
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn old_outcomes_slide_out_of_the_window() {
        let cb = breaker(4, 0.5, Duration::from_secs(30));
        cb.record_failure();
        // Four successes push the failure out of the window.
        for _ in 0..4 {
            cb.record_success();
        }
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_after_cooldown_and_probe_closes() {
        let cb = breaker(4, 0.5, Duration::from_millis(0));
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);

        std::thread::sleep(Duration::from_millis(5));
        assert!(cb.allow_request().is_ok());
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn failed_probe_reopens() {
        let cb = breaker(4, 0.5, Duration::from_millis(0));
        cb.record_failure();
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert!(cb.allow_request().is_ok());
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn half_open_limits_probe_count() {
        let cb = CircuitBreaker::new(BreakerConfig {
            window: 4,
            threshold: 0.5,
            cooldown: Duration::from_millis(0),
            success_threshold: 10,
            half_open_max_attempts: 2,
        });
        cb.record_failure();
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(5));

        assert!(cb.allow_request().is_ok());
        assert!(cb.allow_request().is_ok());
        assert!(cb.allow_request().is_err());
    }

    #[test]
    fn rejecting_only_inside_cooldown() {
        let cb = breaker(2, 0.5, Duration::from_secs(60));
        cb.record_failure();
        assert!(cb.is_rejecting());
        cb.reset();
        assert!(!cb.is_rejecting());
    }
}
