//! HTTP API server for the order service.
//!
//! Exposes order creation (through the saga), owner-scoped queries and status
//! changes behind bearer-token auth, plus health, readiness and Prometheus
//! metrics endpoints.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use axum::routing::{get, patch, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat};
pub use error::ApiError;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
///
/// `/metrics` is only mounted when a Prometheus handle is supplied.
pub fn create_app(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let mut router = Router::new()
        .route("/health", get(routes::health::check))
        .route("/ready", get(routes::health::ready))
        .route("/api/orders", post(routes::orders::create))
        .route("/api/orders/my-orders", get(routes::orders::my_orders))
        .route("/api/orders/{id}", get(routes::orders::get))
        .route("/api/orders/{id}/status", patch(routes::orders::update_status))
        .route("/api/orders/{id}/cancel", post(routes::orders::cancel))
        .with_state(state);

    if let Some(handle) = metrics_handle {
        let metrics_router = Router::new()
            .route("/metrics", get(routes::metrics::get))
            .with_state(handle);
        router = router.merge(metrics_router);
    }

    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
