//! Shared types for the storefront fulfillment system.

mod types;

pub use types::{AdminId, OrderId, ProductId, StockItemId, UserId, VariantId};
