//! Fulfillment error types.

use common::{ProductId, VariantId};
use domain::{CatalogError, OrderError};
use storage::StorageError;
use thiserror::Error;

/// Errors that can occur while assigning stock or fulfilling orders.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// A referenced product, variant, user or order does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The request is malformed (bad quantity, missing variant, empty batch).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Fewer free items than requested. Nothing was claimed.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        variant_id: Option<VariantId>,
        available: u64,
        /// Total asked for the (product, variant), summed across order lines.
        requested: u64,
    },

    /// The order is not in a state that allows the operation.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The payment provider failed or returned an unusable response.
    #[error("Payment provider error: {0}")]
    UpstreamPayment(String),

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),
}

impl FulfillmentError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true for failures scoped to a single order line.
    ///
    /// Storage and provider failures are not line failures; they abort the run.
    pub fn is_line_failure(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Validation(_) | Self::InsufficientStock { .. }
        )
    }
}

impl From<StorageError> for FulfillmentError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::OrderNotFound(id) => Self::not_found("order", id),
            StorageError::ProductNotFound(id) => Self::not_found("product", id),
            StorageError::Order(err) => Self::Order(err),
            other => Self::Storage(other),
        }
    }
}

impl From<CatalogError> for FulfillmentError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::VariantNotFound { variant_id, .. } => Self::not_found("variant", variant_id),
            other => Self::Validation(other.to_string()),
        }
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
