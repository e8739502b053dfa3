//! REST API module using Axum
//!
//! HTTP surface of the incident workflow: intake, queries, resolve, stats
//! and the health probe, all wrapped in a consistent response envelope.

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::ApiState;

use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `INCIDENTFLOW_CORS_ORIGINS` to a comma-separated list of allowed
/// origins for development.
fn build_cors_layer() -> CorsLayer {
    match std::env::var("INCIDENTFLOW_CORS_ORIGINS") {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods([Method::GET, Method::POST, Method::PUT])
                .allow_headers([header::CONTENT_TYPE])
        }
        Err(_) => CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::PUT])
            .allow_headers([header::CONTENT_TYPE]),
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes(state))
        .merge(routes::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
