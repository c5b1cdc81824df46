//! Liveness and metrics endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use domain::FulfillmentPolicy;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use storage::Storage;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub fulfillment_policy: FulfillmentPolicy,
}

/// GET /health
pub async fn health<S: Storage>(State(state): State<Arc<AppState<S>>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        fulfillment_policy: state.coordinator.config().policy,
    })
}

/// GET /metrics, in the Prometheus text format.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
