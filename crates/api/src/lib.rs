//! HTTP API and event listener of the product catalog service.
//!
//! Provides REST endpoints for product management, publishing a product
//! event on every change, with structured logging (tracing) and Prometheus
//! metrics. The inbound event listener is wired up in `main`.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use catalog_store::CatalogStore;
use messaging::EventPublisher;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::products::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CatalogStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/products",
            get(routes::products::list::<S>).post(routes::products::create::<S>),
        )
        .route(
            "/products/{id}",
            get(routes::products::get::<S>)
                .put(routes::products::replace::<S>)
                .delete(routes::products::delete::<S>),
        )
        .route("/products/{id}/orders", get(routes::products::for_order::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over a store and an event publisher.
pub fn create_state<S: CatalogStore + Clone + 'static>(
    store: S,
    publisher: Arc<dyn EventPublisher>,
) -> Arc<AppState<S>> {
    Arc::new(AppState { store, publisher })
}
