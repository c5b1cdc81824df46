//! Payment provider webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fulfillment::{FulfillmentError, ProviderId, WebhookData, WebhookNotification};
use serde::Deserialize;
use serde_json::json;
use storage::Storage;

use crate::AppState;
use crate::error::ApiError;

/// Query-string form of a notification (`?type=payment&data.id=..` or the
/// legacy `?topic=payment&id=..`).
#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    #[serde(rename = "type")]
    pub topic: Option<String>,
    #[serde(rename = "topic")]
    pub legacy_topic: Option<String>,
    #[serde(rename = "data.id")]
    pub data_id: Option<String>,
    pub id: Option<String>,
}

/// POST /webhooks/payments
///
/// Provider errors answer 502 so the provider retries the delivery. An
/// order that can no longer accept the payment answers 200 with a
/// `rejected` result, since a retry cannot change that.
#[tracing::instrument(skip(state, query, body))]
pub async fn payment<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let notification = parse_notification(query, &body)?;

    match state.coordinator.handle_webhook(notification).await {
        Ok(outcome) => Ok((StatusCode::OK, Json(outcome)).into_response()),
        Err(FulfillmentError::Order(err)) => {
            metrics::counter!("payment_webhooks_total", "result" => "rejected").increment(1);
            tracing::warn!(error = %err, "payment notification rejected by order state");
            let body = json!({ "result": "rejected", "error": err.to_string() });
            Ok((StatusCode::OK, Json(body)).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

fn parse_notification(query: WebhookQuery, body: &[u8]) -> Result<WebhookNotification, ApiError> {
    let mut notification = if body.iter().all(u8::is_ascii_whitespace) {
        WebhookNotification::default()
    } else {
        serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid webhook payload: {e}")))?
    };

    if notification.topic.is_none() && notification.action.is_none() {
        notification.topic = query.topic.or(query.legacy_topic);
    }
    if notification.data.is_none()
        && let Some(id) = query.data_id.or(query.id)
    {
        notification.data = Some(WebhookData {
            id: ProviderId::Text(id),
        });
    }
    Ok(notification)
}
