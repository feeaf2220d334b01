//! Infrastructure layer modules
//!
//! This module contains shared infrastructure components:
//! - `config`: Application configuration and settings
//! - `error`: HTTP boundary error type
//! - `metrics`: Prometheus metrics for the session lifecycle
//! - `redis`: Redis connection pool, circuit breaker, backoff and health tracking

pub mod config;
pub mod error;
pub mod metrics;
pub mod redis;
