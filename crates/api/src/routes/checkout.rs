//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use fulfillment::{Checkout, CheckoutReceipt};
use storage::Storage;

use crate::AppState;
use crate::error::ApiError;

/// POST /checkout: creates a pending order and its PIX payment.
#[tracing::instrument(skip(state, checkout))]
pub async fn create<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Json(checkout): Json<Checkout>,
) -> Result<(StatusCode, Json<CheckoutReceipt>), ApiError> {
    let receipt = state.coordinator.checkout(checkout).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
