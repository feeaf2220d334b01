mod health;
mod metrics;
mod routes;
mod session;

pub use health::{health, HealthResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
pub use session::{SessionResponse, SESSION_ROUTE_PREFIX};
