//! Redis high availability module
//!
//! Provides circuit breaker pattern and exponential backoff for the Redis
//! connection that backs session records.
//!
//! # Modules
//!
//! - `CircuitBreaker`: Prevents cascading failures when Redis is unavailable
//! - `ExponentialBackoff`: Provides backoff delays for the startup dial loop
//! - `RedisHealth`: Tracks Redis connection health status
//! - `pool`: Multiplexed connection used by the record store

mod backoff;
mod circuit_breaker;
mod health;
pub mod pool;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use health::{RedisHealth, RedisHealthStats, RedisHealthStatus};
pub use pool::{PoolError, RedisPool};

/// Get current time in milliseconds since epoch
pub(crate) fn current_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
