//! Order payment and fulfillment state.

use serde::{Deserialize, Serialize};

/// Payment state of an order.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Paid
///           ├──► Expired
///           └──► Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Awaiting payment from the customer.
    #[default]
    Pending,

    /// Payment confirmed by the provider.
    Paid,

    /// The payment window elapsed (terminal state).
    Expired,

    /// Canceled before payment (terminal state).
    Canceled,
}

impl PaymentStatus {
    /// Returns true if a payment confirmation can still be accepted.
    pub fn can_confirm(&self) -> bool {
        matches!(self, PaymentStatus::Pending)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "expired" => Ok(PaymentStatus::Expired),
            "canceled" => Ok(PaymentStatus::Canceled),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// Fulfillment state of an order.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Processing ──► Completed
///           ├──► Expired
///           └──► Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Created at checkout, awaiting payment.
    #[default]
    Pending,

    /// Paid; stock is being (or waiting to be) assigned.
    Processing,

    /// Stock assigned (terminal state).
    Completed,

    /// Payment window elapsed (terminal state).
    Expired,

    /// Canceled before payment (terminal state).
    Canceled,
}

impl OrderStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Expired | OrderStatus::Canceled
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Expired => "expired",
            OrderStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "expired" => Ok(OrderStatus::Expired),
            "canceled" => Ok(OrderStatus::Canceled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// How an order with undeliverable lines is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentPolicy {
    /// Complete only when every line is delivered. Availability of all
    /// outstanding lines is checked before anything is claimed.
    AllOrNothing,

    /// Complete once at least one line is delivered; undelivered lines flag
    /// the order for manual review.
    #[default]
    BestEffort,
}

impl std::str::FromStr for FulfillmentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all_or_nothing" => Ok(FulfillmentPolicy::AllOrNothing),
            "best_effort" => Ok(FulfillmentPolicy::BestEffort),
            other => Err(format!("unknown fulfillment policy: {other}")),
        }
    }
}
