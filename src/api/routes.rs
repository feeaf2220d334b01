use axum::{
    routing::{get, post, put},
    Router,
};

use crate::server::AppState;

use super::health::health;
use super::metrics::prometheus_metrics;
use super::session::{
    delete_session_value, get_data, get_session, logout, put_data, put_session_value,
    SESSION_ROUTE_PREFIX,
};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Metrics
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            SESSION_ROUTE_PREFIX,
            Router::new()
                // Cookie-backed session
                .route("/session", get(get_session))
                .route(
                    "/session/{key}",
                    put(put_session_value).delete(delete_session_value),
                )
                .route("/session/logout", post(logout))
                // Bare records, no cookie involved
                .route("/data/{id}", get(get_data).put(put_data)),
        )
}
