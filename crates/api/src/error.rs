//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fulfillment::FulfillmentError;
use serde_json::json;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client (malformed id or body).
    BadRequest(String),
    /// Error raised by the fulfillment services.
    Fulfillment(FulfillmentError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Fulfillment(err) => fulfillment_error_to_response(err),
        };
        (status, axum::Json(body)).into_response()
    }
}

fn fulfillment_error_to_response(err: FulfillmentError) -> (StatusCode, serde_json::Value) {
    let message = err.to_string();
    match err {
        FulfillmentError::NotFound { .. } => (StatusCode::NOT_FOUND, json!({ "error": message })),
        FulfillmentError::Validation(_) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
        FulfillmentError::InsufficientStock {
            available,
            requested,
            ..
        } => (
            StatusCode::CONFLICT,
            json!({ "error": message, "available": available, "requested": requested }),
        ),
        FulfillmentError::Order(_) => (StatusCode::CONFLICT, json!({ "error": message })),
        FulfillmentError::UpstreamPayment(_) => {
            tracing::warn!(error = %message, "payment provider failure");
            (StatusCode::BAD_GATEWAY, json!({ "error": message }))
        }
        FulfillmentError::Storage(_) => {
            tracing::error!(error = %message, "internal server error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "internal server error" }),
            )
        }
    }
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError::Fulfillment(err)
    }
}

/// Parses a path or body identifier, rejecting malformed values with 400.
pub(crate) fn parse_id<T>(raw: &str, what: &str) -> Result<T, ApiError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what} id: {e}")))
}
