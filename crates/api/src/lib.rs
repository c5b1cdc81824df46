//! HTTP API for the digital-goods storefront.
//!
//! Exposes checkout, payment webhooks and polling, order fulfillment and
//! stock administration over the fulfillment coordinator, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod demo;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use fulfillment::FulfillmentCoordinator;
use metrics_exporter_prometheus::PrometheusHandle;
use storage::Storage;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub coordinator: FulfillmentCoordinator<S>,
}

impl<S: Storage> AppState<S> {
    pub fn new(coordinator: FulfillmentCoordinator<S>) -> Arc<Self> {
        Arc::new(Self { coordinator })
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Storage>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health::<S>))
        .route("/checkout", post(routes::checkout::create::<S>))
        .route("/webhooks/payments", post(routes::webhooks::payment::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/fulfill", post(routes::orders::fulfill::<S>))
        .route("/orders/{id}/payment", get(routes::orders::payment::<S>))
        .route("/users/{id}/items", get(routes::users::items::<S>))
        .route("/admin/stock/assign", post(routes::admin::assign_stock::<S>))
        .route(
            "/admin/products/{id}/stock",
            post(routes::admin::import_stock::<S>),
        )
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
