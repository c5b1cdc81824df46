use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, StockItemId, UserId};
use domain::{AssignedBy, Order, OrderError, Product, StockAssignment, StockItem, StockKey, User};

use crate::Result;

/// Counts reported by a bulk import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    /// New stock items created.
    pub added: u64,
    /// Lines skipped because the code already exists (or repeats in the batch).
    pub duplicates: u64,
}

/// Who receives claimed stock, and on whose behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimRequest {
    pub user_id: UserId,
    pub order_id: Option<OrderId>,
    pub assigned_by: AssignedBy,
    pub assigned_at: DateTime<Utc>,
}

impl ClaimRequest {
    /// The assignment recorded on every claimed item.
    pub fn assignment(&self) -> StockAssignment {
        StockAssignment {
            user_id: self.user_id,
            assigned_at: self.assigned_at,
            order_id: self.order_id,
            assigned_by: self.assigned_by,
        }
    }
}

/// Result of an all-or-nothing claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Exactly the requested number of items, now assigned.
    Claimed(Vec<StockItem>),
    /// Not enough free items; nothing was claimed.
    Insufficient { available: u64 },
}

/// The stock ledger: serialized items per (product, variant).
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Creates one free item per code.
    ///
    /// Codes already present for the key, or repeated within the batch, are
    /// counted as duplicates and skipped. The batch never fails on duplicates.
    async fn import_codes(
        &self,
        key: StockKey,
        codes: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<ImportOutcome>;

    /// Counts free items for a key.
    async fn count_free(&self, key: StockKey) -> Result<u64>;

    /// Atomically claims exactly `quantity` free items for a key.
    ///
    /// Either all `quantity` items are assigned to `request.user_id`, or none
    /// are and `Insufficient` reports how many were free. Concurrent claims
    /// never receive the same item.
    async fn claim(
        &self,
        key: StockKey,
        quantity: u32,
        request: &ClaimRequest,
    ) -> Result<ClaimOutcome>;

    /// Items already assigned to an order for a key.
    async fn assigned_to_order(&self, order_id: OrderId, key: StockKey) -> Result<Vec<StockItem>>;

    /// Every item assigned to a user, newest first.
    async fn items_for_user(&self, user_id: UserId) -> Result<Vec<StockItem>>;

    /// Loads a single item.
    async fn get_item(&self, id: StockItemId) -> Result<Option<StockItem>>;
}

/// Products and their cached stock counters.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Inserts or replaces a product and its variants.
    async fn save_product(&self, product: Product) -> Result<()>;

    /// Recounts free items for a key and writes the count to the product (or
    /// variant) counter in one atomic step. Returns the new count.
    async fn refresh_stock(&self, key: StockKey) -> Result<u64>;
}

/// Order persistence with atomic transitions.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert_order(&self, order: Order) -> Result<()>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn find_by_payment_id(&self, payment_id: &str) -> Result<Option<Order>>;

    /// Pending orders whose payment window ended at or before `now`.
    async fn pending_expired_before(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>>;

    /// Applies a transition to the latest stored state of an order.
    ///
    /// The read, the transition and the write happen atomically with respect
    /// to every other `modify` on the same order, so a transition such as
    /// `Pending -> Paid` is a single conditional write. If `transition`
    /// returns an error nothing is written. Returns the transition's value
    /// and the resulting order.
    async fn modify<T, F>(&self, id: OrderId, transition: F) -> Result<(T, Order)>
    where
        T: Send,
        F: FnOnce(&mut Order) -> std::result::Result<T, OrderError> + Send;
}

/// Customer accounts.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    async fn save_user(&self, user: User) -> Result<()>;
}

/// Everything the fulfillment services need from storage.
pub trait Storage:
    StockLedger + Catalog + OrderRepository + UserDirectory + Clone + 'static
{
}

impl<T> Storage for T where
    T: StockLedger + Catalog + OrderRepository + UserDirectory + Clone + 'static
{
}

/// Splits a batch into unique codes and the number of in-batch repeats.
pub(crate) fn dedupe_batch(codes: Vec<String>) -> (Vec<String>, u64) {
    let mut seen = std::collections::HashSet::with_capacity(codes.len());
    let mut unique = Vec::with_capacity(codes.len());
    let mut repeats = 0;
    for code in codes {
        if seen.insert(code.clone()) {
            unique.push(code);
        } else {
            repeats += 1;
        }
    }
    (unique, repeats)
}
