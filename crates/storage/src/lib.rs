//! Persistence for the storefront fulfillment system.
//!
//! Two implementations share the same traits: [`InMemoryStorage`] for tests
//! and local runs, and [`PostgresStorage`] for production. Both guarantee that
//! a stock item is claimed by at most one caller and that cached stock
//! counters are always written from a recount.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StorageError};
pub use memory::InMemoryStorage;
pub use postgres::PostgresStorage;
pub use store::{
    Catalog, ClaimOutcome, ClaimRequest, ImportOutcome, OrderRepository, StockLedger, Storage,
    UserDirectory,
};
