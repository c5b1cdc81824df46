//! Domain layer for the storefront fulfillment system.
//!
//! This crate provides the core entities and their pure transitions:
//! - Stock items, the (product, variant) ledger key and assignment metadata
//! - Products with optional variants and their cached stock counters
//! - The order state machine, including the fulfillment lease and policy

pub mod catalog;
pub mod money;
pub mod order;
pub mod stock;

pub use catalog::{CatalogError, Product, User, Variant};
pub use money::Money;
pub use order::{
    FulfillmentLease, FulfillmentPolicy, HistoryEntry, LeaseOutcome, Order, OrderError,
    OrderHistoryEvent, OrderLine, OrderStatus, PaymentInfo, PaymentMethod, PaymentStatus,
};
pub use stock::{AssignedBy, StockAssignment, StockItem, StockKey, parse_stock_lines};
