//! Order record, lifecycle states and fulfillment policy.

mod aggregate;
mod state;

pub use aggregate::{
    FulfillmentLease, HistoryEntry, LeaseOutcome, Order, OrderHistoryEvent, OrderLine,
    PaymentInfo, PaymentMethod,
};
pub use state::{FulfillmentPolicy, OrderStatus, PaymentStatus};

use thiserror::Error;

/// Errors that can occur during order transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Order is not in the expected state.
    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: OrderStatus,
        action: &'static str,
    },

    /// Fulfillment requested before the payment was confirmed.
    #[error("Order is not paid (payment status: {payment_status})")]
    NotPaid { payment_status: PaymentStatus },

    /// A confirmation arrived for a different payment than the one attached.
    #[error("Payment mismatch: order has {expected}, got {actual}")]
    PaymentMismatch { expected: String, actual: String },

    /// The caller does not hold the fulfillment lease.
    #[error("Fulfillment lease is not held by this caller")]
    LeaseNotHeld,

    /// Line index out of range.
    #[error("Order line not found: {index}")]
    LineNotFound { index: usize },

    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,
}
