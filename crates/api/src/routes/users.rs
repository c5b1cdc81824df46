//! Per-user delivered stock.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{AdminId, OrderId, ProductId, StockItemId, UserId, VariantId};
use domain::StockItem;
use serde::Serialize;
use storage::{StockLedger, Storage};

use crate::AppState;
use crate::error::{ApiError, parse_id};

/// A stock item as shown to its owner.
#[derive(Serialize)]
pub struct UserItemResponse {
    pub id: StockItemId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub code: String,
    pub order_id: Option<OrderId>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub assigned_by: Option<&'static str>,
    pub admin_id: Option<AdminId>,
}

impl From<StockItem> for UserItemResponse {
    fn from(item: StockItem) -> Self {
        let assignment = item.assignment.as_ref();
        Self {
            id: item.id,
            product_id: item.key.product_id,
            variant_id: item.key.variant_id,
            order_id: assignment.and_then(|a| a.order_id),
            assigned_at: assignment.map(|a| a.assigned_at),
            assigned_by: assignment.map(|a| a.assigned_by.kind()),
            admin_id: assignment.and_then(|a| a.assigned_by.admin_id()),
            code: item.code,
        }
    }
}

/// GET /users/{id}/items
#[tracing::instrument(skip(state))]
pub async fn items<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<UserItemResponse>>, ApiError> {
    let user_id: UserId = parse_id(&id, "user")?;
    let lookup = state.coordinator.engine().lookup();
    lookup.user(user_id).await?;

    let items = lookup
        .storage()
        .items_for_user(user_id)
        .await
        .map_err(fulfillment::FulfillmentError::from)?;
    Ok(Json(items.into_iter().map(UserItemResponse::from).collect()))
}
