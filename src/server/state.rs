use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::config::Settings;
use crate::redis::{CircuitBreaker, RedisHealth, RedisPool};
use crate::session::{create_record_store, generate_session_id, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub session_store: Arc<SessionStore>,
    pub redis_pool: Option<Arc<RedisPool>>,
    pub start_time: Instant,
}

impl AppState {
    /// Build the state, dialing Redis first when it is the configured backend.
    pub async fn new(mut settings: Settings) -> Result<Self> {
        if settings.session.secrets.is_empty() {
            tracing::warn!(
                "No session secrets configured, using an ephemeral secret; \
                 cookies will not survive a restart"
            );
            settings.session.secrets.push(generate_session_id());
        }

        let redis_pool = if settings.session.backend == "redis" {
            let pool = RedisPool::new(
                settings.redis.clone(),
                Arc::new(CircuitBreaker::with_config((&settings.redis).into())),
                Arc::new(RedisHealth::new()),
            )
            .context("Invalid Redis URL")?;
            pool.connect_with_retry()
                .await
                .context("Redis is not reachable")?;
            Some(Arc::new(pool))
        } else {
            None
        };

        let records = create_record_store(&settings.session, redis_pool.clone());
        let session_store = SessionStore::from_config(&settings.session, records)
            .context("Invalid session configuration")?;

        Ok(Self::with_store(settings, Arc::new(session_store), redis_pool))
    }

    pub fn with_store(
        settings: Settings,
        session_store: Arc<SessionStore>,
        redis_pool: Option<Arc<RedisPool>>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            session_store,
            redis_pool,
            start_time: Instant::now(),
        }
    }

    /// Cookie name used by the session endpoints
    pub fn cookie_name(&self) -> &str {
        &self.settings.session.cookie_name
    }
}
