//! Redis connection health tracking

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};

use super::current_time_ms;

/// Redis connection health status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RedisHealthStatus {
    /// Connected and the last command succeeded
    Healthy = 0,
    /// Not connected yet, or the connection dropped
    Reconnecting = 1,
    /// Circuit breaker is open, commands are short-circuited
    CircuitOpen = 2,
}

impl RedisHealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedisHealthStatus::Healthy => "healthy",
            RedisHealthStatus::Reconnecting => "reconnecting",
            RedisHealthStatus::CircuitOpen => "circuit_open",
        }
    }
}

impl From<u8> for RedisHealthStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => RedisHealthStatus::Healthy,
            2 => RedisHealthStatus::CircuitOpen,
            _ => RedisHealthStatus::Reconnecting,
        }
    }
}

/// Shared health tracker for the session Redis connection.
///
/// Updated by [`RedisPool`](super::RedisPool) on every connect and command,
/// read by the `/health` endpoint.
pub struct RedisHealth {
    status: AtomicU8,
    last_connected_ms: AtomicI64,
    connects: AtomicU64,
    failed_commands: AtomicU64,
}

impl RedisHealth {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(RedisHealthStatus::Reconnecting as u8),
            last_connected_ms: AtomicI64::new(0),
            connects: AtomicU64::new(0),
            failed_commands: AtomicU64::new(0),
        }
    }

    /// Mark the connection as established
    pub fn set_connected(&self) {
        self.status
            .store(RedisHealthStatus::Healthy as u8, Ordering::Release);
        self.last_connected_ms
            .store(current_time_ms(), Ordering::Release);
        self.connects.fetch_add(1, Ordering::AcqRel);
    }

    /// Mark the connection as lost
    pub fn set_reconnecting(&self) {
        self.status
            .store(RedisHealthStatus::Reconnecting as u8, Ordering::Release);
    }

    /// Mark circuit as open
    pub fn set_circuit_open(&self) {
        self.status
            .store(RedisHealthStatus::CircuitOpen as u8, Ordering::Release);
    }

    /// Count a failed GET/SET/DEL
    pub fn record_command_failure(&self) {
        self.failed_commands.fetch_add(1, Ordering::AcqRel);
    }

    pub fn status(&self) -> RedisHealthStatus {
        RedisHealthStatus::from(self.status.load(Ordering::Acquire))
    }

    pub fn is_healthy(&self) -> bool {
        self.status() == RedisHealthStatus::Healthy
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> RedisHealthStats {
        RedisHealthStats {
            status: self.status(),
            last_connected_ms: self.last_connected_ms.load(Ordering::Acquire),
            connects: self.connects.load(Ordering::Acquire),
            failed_commands: self.failed_commands.load(Ordering::Acquire),
        }
    }
}

impl Default for RedisHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Redis health statistics
#[derive(Debug, Clone)]
pub struct RedisHealthStats {
    pub status: RedisHealthStatus,
    pub last_connected_ms: i64,
    pub connects: u64,
    pub failed_commands: u64,
}
