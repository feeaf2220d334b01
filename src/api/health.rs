//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::redis::RedisHealthStatus;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub session: SessionHealthResponse,
    /// Absent when sessions are kept in memory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisHealthResponse>,
}

#[derive(Debug, Serialize)]
pub struct SessionHealthResponse {
    pub backend: String,
    pub serializer: String,
    pub max_age: i64,
    pub codecs: usize,
}

#[derive(Debug, Serialize)]
pub struct RedisHealthResponse {
    pub status: String,
    pub connected: bool,
    pub circuit_breaker_state: String,
    pub circuit_breaker_failures: u32,
    pub failed_commands: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = &state.session_store;

    let redis = state.redis_pool.as_ref().map(|pool| {
        let health = pool.health().stats();
        let circuit_breaker = pool.circuit_breaker().stats();
        RedisHealthResponse {
            status: health.status.as_str().to_string(),
            connected: health.status == RedisHealthStatus::Healthy,
            circuit_breaker_state: circuit_breaker.state.as_str().to_string(),
            circuit_breaker_failures: circuit_breaker.consecutive_failures,
            failed_commands: health.failed_commands,
        }
    });

    let healthy = redis.as_ref().map(|r| r.connected).unwrap_or(true);
    let status = if healthy { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        session: SessionHealthResponse {
            backend: store.record_store().backend_type().as_str().to_string(),
            serializer: store.serializer_kind().as_str().to_string(),
            max_age: store.max_age(),
            codecs: store.codecs().len(),
        },
        redis,
    })
}
