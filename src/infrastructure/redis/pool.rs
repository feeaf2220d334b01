//! Redis connection pool for session records.
//!
//! Wraps a single multiplexed connection shared by every request, with
//! circuit breaker and health bookkeeping around each command.

use std::future::Future;
use std::sync::Arc;

use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError, RedisResult};
use tokio::sync::RwLock;

use crate::config::RedisConfig;

use super::{CircuitBreaker, CircuitState, ExponentialBackoff, RedisHealth};

/// Error type for Redis pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    /// Circuit breaker is open
    #[error("Circuit breaker is open")]
    CircuitOpen,
}

/// Redis connection pool for session data.
///
/// The multiplexed connection is cloned per command, so concurrent requests
/// issue independent commands over one socket. A dropped connection is
/// discarded and re-established lazily on the next command.
pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    circuit_breaker: Arc<CircuitBreaker>,
    health: Arc<RedisHealth>,
    config: RedisConfig,
}

impl RedisPool {
    pub fn new(
        config: RedisConfig,
        circuit_breaker: Arc<CircuitBreaker>,
        health: Arc<RedisHealth>,
    ) -> Result<Self, PoolError> {
        let client = Client::open(config.url.as_str())?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            circuit_breaker,
            health,
            config,
        })
    }

    /// Dial and PING Redis, retrying with exponential backoff.
    ///
    /// Used at startup so a misconfigured URL fails the process instead of
    /// the first request.
    pub async fn connect_with_retry(&self) -> Result<(), PoolError> {
        let mut backoff = ExponentialBackoff::with_config((&self.config).into());

        loop {
            match self.ping().await {
                Ok(()) => return Ok(()),
                Err(e) => match backoff.next_delay() {
                    Some(delay) => {
                        tracing::warn!(
                            error = %e,
                            attempt = backoff.attempt(),
                            delay_ms = delay.as_millis() as u64,
                            "Redis not reachable, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    /// Get a connection, establishing one if none exists.
    ///
    /// Returns an error if the circuit breaker is open.
    pub async fn get_connection(&self) -> Result<MultiplexedConnection, PoolError> {
        if !self.circuit_breaker.allow_request() {
            self.health.set_circuit_open();
            return Err(PoolError::CircuitOpen);
        }

        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        self.connect().await
    }

    async fn connect(&self) -> Result<MultiplexedConnection, PoolError> {
        let mut conn_guard = self.connection.write().await;

        // Another task may have connected while we waited for the lock
        if let Some(ref c) = *conn_guard {
            return Ok(c.clone());
        }

        self.health.set_reconnecting();

        match self.client.get_multiplexed_tokio_connection().await {
            Ok(conn) => {
                *conn_guard = Some(conn.clone());
                self.circuit_breaker.record_success();
                self.health.set_connected();
                tracing::info!(url = %self.config.url, "Redis session connection established");
                Ok(conn)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                tracing::error!(error = %e, "Failed to connect to Redis");
                Err(PoolError::Redis(e))
            }
        }
    }

    /// Execute a Redis command with circuit breaker protection.
    pub async fn execute<F, T, Fut>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.get_connection().await?;

        match f(conn).await {
            Ok(result) => {
                self.circuit_breaker.record_success();
                Ok(result)
            }
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() {
                    let mut conn_guard = self.connection.write().await;
                    *conn_guard = None;
                    self.health.set_reconnecting();
                }
                self.health.record_command_failure();
                self.circuit_breaker.record_failure();
                Err(PoolError::Redis(e))
            }
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy() && self.circuit_breaker.state() == CircuitState::Closed
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    pub fn health(&self) -> &RedisHealth {
        &self.health
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub async fn ping(&self) -> Result<(), PoolError> {
        self.execute(|mut conn| async move {
            let pong: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
            pong
        })
        .await
        .map(|_| ())
    }
}
