//! Prometheus metrics endpoint.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::metrics;
use crate::redis::{CircuitState, RedisHealthStatus};
use crate::server::AppState;

/// GET /metrics - Prometheus metrics endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    update_redis_gauges(&state);

    match metrics::encode_metrics() {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

fn update_redis_gauges(state: &AppState) {
    let Some(pool) = state.redis_pool.as_ref() else {
        return;
    };

    let connected = pool.health().status() == RedisHealthStatus::Healthy;
    metrics::REDIS_CONNECTION_STATUS.set(if connected { 1 } else { 0 });

    let cb_state = match pool.circuit_state() {
        CircuitState::Closed => 0,
        CircuitState::Open => 1,
        CircuitState::HalfOpen => 2,
    };
    metrics::REDIS_CIRCUIT_BREAKER_STATE.set(cb_state);
}
