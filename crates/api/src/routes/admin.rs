//! Stock administration endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{AdminId, OrderId, ProductId, UserId, VariantId};
use domain::{AssignedBy, parse_stock_lines};
use fulfillment::{AssignStock, Assignment, ImportReport};
use serde::Deserialize;
use storage::Storage;

use crate::AppState;
use crate::error::{ApiError, parse_id};

#[derive(Debug, Deserialize)]
pub struct AssignStockRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub user_id: UserId,
    pub quantity: u32,
    pub admin_id: AdminId,
    #[serde(default)]
    pub order_id: Option<OrderId>,
}

/// New stock for a product: explicit `codes`, a newline-delimited
/// `payload`, or both.
#[derive(Debug, Deserialize)]
pub struct ImportStockRequest {
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    #[serde(default)]
    pub codes: Option<Vec<String>>,
    #[serde(default)]
    pub payload: Option<String>,
}

/// POST /admin/stock/assign: hands stock to a user outside checkout.
#[tracing::instrument(
    skip(state, req),
    fields(product_id = %req.product_id, user_id = %req.user_id)
)]
pub async fn assign_stock<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<AssignStockRequest>,
) -> Result<Json<Assignment>, ApiError> {
    let assignment = state
        .coordinator
        .engine()
        .assign_stock(AssignStock {
            product_id: req.product_id,
            variant_id: req.variant_id,
            user_id: req.user_id,
            quantity: req.quantity,
            order_id: req.order_id,
            assigned_by: AssignedBy::Admin(req.admin_id),
        })
        .await?;
    Ok(Json(assignment))
}

/// POST /admin/products/{id}/stock: bulk import of redeemable codes.
#[tracing::instrument(skip(state, req))]
pub async fn import_stock<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ImportStockRequest>,
) -> Result<(StatusCode, Json<ImportReport>), ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    if req.codes.is_none() && req.payload.is_none() {
        return Err(ApiError::BadRequest(
            "Either codes or payload is required".to_string(),
        ));
    }

    let mut codes = req.codes.unwrap_or_default();
    if let Some(payload) = req.payload.as_deref() {
        codes.extend(parse_stock_lines(payload));
    }

    let report = state
        .coordinator
        .importer()
        .bulk_import_stock(product_id, req.variant_id, codes)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}
