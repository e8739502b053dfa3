//! API route definitions
//!
//! Organizes endpoints for the incident workflow:
//! - /api/v1/incidents - create and query incidents
//! - /api/v1/incidents/:id/resolve - resolve mutation
//! - /api/v1/notifications/:incident_id - notification audit log
//! - /api/v1/stats - aggregate counts

use axum::routing::{get, post, put};
use axum::Router;

use super::handlers::{self, ApiState};

/// Create all /api/v1 routes.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/incidents", post(handlers::create_incident))
        .route("/incidents/:id", get(handlers::get_incident))
        .route(
            "/incidents/customer/:customer_id",
            get(handlers::get_customer_incidents),
        )
        .route("/incidents/:id/resolve", put(handlers::resolve_incident))
        .route(
            "/notifications/:incident_id",
            get(handlers::get_incident_notifications),
        )
        .route("/stats", get(handlers::get_stats))
        .with_state(state)
}

/// Health endpoint at root level.
pub fn health_routes() -> Router {
    Router::new().route("/health", get(handlers::health_check))
}
