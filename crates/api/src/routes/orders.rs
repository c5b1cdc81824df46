//! Order lookup, fulfillment trigger and payment polling endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId, VariantId};
use domain::{Order, OrderStatus, PaymentStatus};
use fulfillment::{FulfillmentReport, PaymentCheck};
use serde::Serialize;
use storage::Storage;

use crate::AppState;
use crate::error::{ApiError, parse_id};

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub user_id: UserId,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub product_assigned: bool,
    pub needs_review: bool,
    pub total_cents: i64,
    pub lines: Vec<OrderLineResponse>,
    pub payment: Option<PaymentResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub delivered: u32,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub payment_id: String,
    pub provider_status: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub qr_code: Option<String>,
    pub ticket_url: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id(),
            user_id: order.user_id(),
            payment_status: order.payment_status(),
            order_status: order.order_status(),
            product_assigned: order.product_assigned(),
            needs_review: order.needs_review(),
            total_cents: order.total().cents(),
            lines: order
                .lines()
                .iter()
                .map(|line| OrderLineResponse {
                    product_id: line.product_id,
                    variant_id: line.variant_id,
                    product_name: line.product_name.clone(),
                    quantity: line.quantity,
                    unit_price_cents: line.unit_price.cents(),
                    delivered: line.quantity - line.outstanding(),
                })
                .collect(),
            payment: order.payment().map(|payment| PaymentResponse {
                payment_id: payment.payment_id.clone(),
                provider_status: payment.provider_status.clone(),
                expires_at: payment.expires_at,
                qr_code: payment.qr_code.clone(),
                ticket_url: payment.ticket_url.clone(),
                paid_at: payment.paid_at,
            }),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

// -- Handlers --

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = state.coordinator.order(order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/fulfill: runs (or resumes) fulfillment of a paid order.
#[tracing::instrument(skip(state))]
pub async fn fulfill<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<FulfillmentReport>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let report = state.coordinator.fulfill_order(order_id).await?;
    Ok(Json(report))
}

/// GET /orders/{id}/payment: polls the provider and confirms on approval.
#[tracing::instrument(skip(state))]
pub async fn payment<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<PaymentCheck>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let check = state.coordinator.check_payment(order_id).await?;
    Ok(Json(check))
}
