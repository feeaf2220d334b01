//! Circuit breaker guarding the session Redis connection

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};

use crate::config::RedisConfig;

use super::current_time_ms;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Commands flow through normally
    Closed = 0,
    /// Commands are rejected without touching Redis
    Open = 1,
    /// Probe commands are let through to test recovery
    HalfOpen = 2,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Half-open successes before closing again
    pub success_threshold: u32,
    /// Time spent open before probing (ms)
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout_ms: 30_000,
        }
    }
}

impl From<&RedisConfig> for CircuitBreakerConfig {
    fn from(config: &RedisConfig) -> Self {
        Self {
            failure_threshold: config.circuit_breaker_failure_threshold,
            success_threshold: config.circuit_breaker_success_threshold,
            reset_timeout_ms: config.circuit_breaker_reset_timeout_seconds * 1000,
        }
    }
}

/// Lock-free circuit breaker.
///
/// A session read that cannot reach Redis is surfaced as an error to the
/// request; once Redis is clearly down the breaker fails those requests
/// fast instead of letting each one wait on the socket.
pub struct CircuitBreaker {
    state: AtomicU8,
    /// Consecutive failures while closed, consecutive successes while half-open
    counter: AtomicU32,
    opened_at_ms: AtomicI64,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            counter: AtomicU32::new(0),
            opened_at_ms: AtomicI64::new(0),
            config,
        }
    }

    /// Current state, moving Open to HalfOpen once the reset timeout elapsed
    pub fn state(&self) -> CircuitState {
        let state = CircuitState::from(self.state.load(Ordering::Acquire));
        if state != CircuitState::Open {
            return state;
        }

        let elapsed = current_time_ms() - self.opened_at_ms.load(Ordering::Acquire);
        if elapsed < self.config.reset_timeout_ms as i64 {
            return CircuitState::Open;
        }

        if self
            .state
            .compare_exchange(
                CircuitState::Open as u8,
                CircuitState::HalfOpen as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.counter.store(0, Ordering::Release);
            tracing::info!("Session store circuit breaker half-open, probing Redis");
        }
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn allow_request(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn record_success(&self) {
        match CircuitState::from(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => self.counter.store(0, Ordering::Release),
            CircuitState::HalfOpen => {
                let successes = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold {
                    self.transition_to(CircuitState::Closed);
                    tracing::info!("Session store circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        match CircuitState::from(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => {
                let failures = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    self.transition_to(CircuitState::Open);
                    tracing::warn!(failures, "Session store circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                self.transition_to(CircuitState::Open);
                tracing::warn!("Redis probe failed, circuit breaker reopened");
            }
            CircuitState::Open => {
                self.opened_at_ms.store(current_time_ms(), Ordering::Release);
            }
        }
    }

    fn transition_to(&self, state: CircuitState) {
        self.state.store(state as u8, Ordering::Release);
        self.counter.store(0, Ordering::Release);
        if state == CircuitState::Open {
            self.opened_at_ms.store(current_time_ms(), Ordering::Release);
        }
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let state = self.state();
        CircuitBreakerStats {
            state,
            consecutive_failures: if state == CircuitState::Closed {
                self.counter.load(Ordering::Acquire)
            } else {
                0
            },
            opened_at_ms: self.opened_at_ms.load(Ordering::Acquire),
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker(failure_threshold: u32, reset_timeout_ms: u64) -> CircuitBreaker {
        CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold,
            success_threshold: 2,
            reset_timeout_ms,
        })
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let cb = breaker(3, 60_000);

        cb.record_failure();
        cb.record_failure();
        assert!(cb.allow_request());
        assert_eq!(cb.stats().consecutive_failures, 2);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let cb = breaker(2, 60_000);

        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_recovers_after_successes() {
        let cb = breaker(1, 10);

        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker(1, 10);

        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_failure();
        assert_eq!(
            CircuitState::from(cb.state.load(Ordering::Acquire)),
            CircuitState::Open
        );
    }
}
