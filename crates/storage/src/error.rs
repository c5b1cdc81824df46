use common::{OrderId, ProductId};
use domain::OrderError;
use thiserror::Error;

/// Errors that can occur when interacting with storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The order was not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The product was not found.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// A transition was rejected by the order state machine.
    #[error("Order transition rejected: {0}")]
    Order(#[from] OrderError),

    /// A stored row could not be mapped back to a domain value.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
