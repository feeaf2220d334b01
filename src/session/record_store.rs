//! Remote record storage.
//!
//! [`RecordStore`] is the whole contract the session layer needs from the
//! key-value backend: overwrite with TTL, read distinguishing "absent" from
//! "failed", idempotent delete. Keys arrive fully namespaced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::{AsyncCommands, RedisResult};

use crate::config::SessionConfig;
use crate::redis::{PoolError, RedisPool};

/// Error type for record store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Redis(#[from] PoolError),

    #[error("Record backend error: {0}")]
    Backend(String),
}

/// Backend type for the record store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStoreBackend {
    Memory,
    Redis,
}

impl RecordStoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStoreBackend::Memory => "memory",
            RecordStoreBackend::Redis => "redis",
        }
    }
}

/// Key-value backend for session records
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn backend_type(&self) -> RecordStoreBackend;

    /// `Ok(None)` when the key does not exist
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Unconditional overwrite. A TTL of zero or less means the backend's
    /// default TTL, never "keep forever".
    async fn set(&self, key: &str, value: &[u8], ttl_seconds: i64) -> Result<(), StoreError>;

    /// Deleting a missing key succeeds
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

fn effective_ttl(ttl_seconds: i64, default_ttl_seconds: i64) -> u64 {
    if ttl_seconds > 0 {
        ttl_seconds as u64
    } else {
        default_ttl_seconds.max(1) as u64
    }
}

/// Redis-backed record store (GET / SET EX / DEL)
pub struct RedisRecordStore {
    pool: Arc<RedisPool>,
    default_ttl_seconds: i64,
}

impl RedisRecordStore {
    pub fn new(pool: Arc<RedisPool>, default_ttl_seconds: i64) -> Self {
        Self {
            pool,
            default_ttl_seconds,
        }
    }
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    fn backend_type(&self) -> RecordStoreBackend {
        RecordStoreBackend::Redis
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let key = key.to_string();
        let data = self
            .pool
            .execute(|mut conn| async move {
                let data: RedisResult<Option<Vec<u8>>> = conn.get(&key).await;
                data
            })
            .await?;
        Ok(data)
    }

    async fn set(&self, key: &str, value: &[u8], ttl_seconds: i64) -> Result<(), StoreError> {
        let key = key.to_string();
        let value = value.to_vec();
        let ttl = effective_ttl(ttl_seconds, self.default_ttl_seconds);

        self.pool
            .execute(|mut conn| async move { conn.set_ex::<_, _, ()>(&key, value, ttl).await })
            .await?;

        tracing::debug!(ttl_seconds = ttl, "Session record written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.pool
            .execute(|mut conn| async move { conn.del::<_, ()>(&key).await })
            .await?;
        Ok(())
    }
}

struct MemoryRecord {
    data: Vec<u8>,
    expires_at: Instant,
}

/// Writes between two sweeps of expired memory records
pub const MEMORY_CLEANUP_INTERVAL: u64 = 256;

/// In-memory record store.
///
/// Records are lost on restart. Expired entries are treated as absent, dropped
/// when next touched, and swept every [`MEMORY_CLEANUP_INTERVAL`] writes.
pub struct MemoryRecordStore {
    records: DashMap<String, MemoryRecord>,
    default_ttl_seconds: i64,
    writes: AtomicU64,
}

impl MemoryRecordStore {
    pub fn new(default_ttl_seconds: i64) -> Self {
        Self {
            records: DashMap::new(),
            default_ttl_seconds,
            writes: AtomicU64::new(0),
        }
    }

    /// Drop every expired record, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, record| record.expires_at > now);
        let removed = before.saturating_sub(self.records.len());

        if removed > 0 {
            tracing::debug!(removed, "Expired session records cleaned up");
        }
        removed
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.cleanup_expired();
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining lifetime of a record, if present
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.records
            .get(key)
            .and_then(|record| record.expires_at.checked_duration_since(Instant::now()))
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    fn backend_type(&self) -> RecordStoreBackend {
        RecordStoreBackend::Memory
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        if let Some(record) = self.records.get(key) {
            if record.expires_at > now {
                return Ok(Some(record.data.clone()));
            }
        }
        self.records.remove_if(key, |_, record| record.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl_seconds: i64) -> Result<(), StoreError> {
        let ttl = effective_ttl(ttl_seconds, self.default_ttl_seconds);
        let expires_at = Instant::now()
            .checked_add(Duration::from_secs(ttl))
            .ok_or_else(|| StoreError::Backend(format!("TTL out of range: {}s", ttl)))?;

        self.records.insert(
            key.to_string(),
            MemoryRecord {
                data: value.to_vec(),
                expires_at,
            },
        );

        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % MEMORY_CLEANUP_INTERVAL == 0 {
            self.cleanup_expired();
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.records.remove(key);
        Ok(())
    }
}

/// Create a record store based on configuration.
///
/// `"redis"` needs a pool; without one the memory backend is used.
pub fn create_record_store(
    config: &SessionConfig,
    redis_pool: Option<Arc<RedisPool>>,
) -> Arc<dyn RecordStore> {
    match (config.backend.as_str(), redis_pool) {
        ("redis", Some(pool)) => {
            tracing::info!(
                backend = "redis",
                url = %pool.url(),
                key_prefix = %config.key_prefix,
                "Creating Redis session record store"
            );
            Arc::new(RedisRecordStore::new(pool, config.default_max_age))
        }
        ("redis", None) => {
            tracing::warn!("Redis session backend requested but no pool provided, falling back to memory");
            Arc::new(MemoryRecordStore::new(config.default_max_age))
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory session record store");
            Arc::new(MemoryRecordStore::new(config.default_max_age))
        }
    }
}
