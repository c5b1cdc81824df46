use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, StockItemId, UserId};
use domain::{Order, OrderError, Product, StockItem, StockKey, User};
use tokio::sync::RwLock;

use crate::store::{
    Catalog, ClaimOutcome, ClaimRequest, ImportOutcome, OrderRepository, StockLedger,
    UserDirectory, dedupe_batch,
};
use crate::{Result, StorageError};

#[derive(Default)]
struct MemoryState {
    items: HashMap<StockItemId, StockItem>,
    codes: HashSet<(StockKey, String)>,
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    users: HashMap<UserId, User>,
}

impl MemoryState {
    fn free_items(&self, key: StockKey) -> impl Iterator<Item = &StockItem> {
        self.items
            .values()
            .filter(move |item| item.key == key && !item.is_used())
    }
}

/// In-memory storage implementation for testing and local runs.
///
/// A single lock guards all collections, which makes every claim and every
/// order transition trivially atomic.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStorage {
    /// Creates a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of stock items stored.
    pub async fn item_count(&self) -> usize {
        self.state.read().await.items.len()
    }

    /// Returns every item for a key, free or assigned.
    pub async fn items_for_key(&self, key: StockKey) -> Vec<StockItem> {
        let state = self.state.read().await;
        let mut items: Vec<_> = state
            .items
            .values()
            .filter(|item| item.key == key)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.code.cmp(&b.code)));
        items
    }
}

#[async_trait]
impl StockLedger for InMemoryStorage {
    async fn import_codes(
        &self,
        key: StockKey,
        codes: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<ImportOutcome> {
        let (unique, repeats) = dedupe_batch(codes);
        let mut state = self.state.write().await;

        let mut outcome = ImportOutcome {
            added: 0,
            duplicates: repeats,
        };
        for code in unique {
            if !state.codes.insert((key, code.clone())) {
                outcome.duplicates += 1;
                continue;
            }
            let item = StockItem::new(key, code, now);
            state.items.insert(item.id, item);
            outcome.added += 1;
        }
        Ok(outcome)
    }

    async fn count_free(&self, key: StockKey) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state.free_items(key).count() as u64)
    }

    async fn claim(
        &self,
        key: StockKey,
        quantity: u32,
        request: &ClaimRequest,
    ) -> Result<ClaimOutcome> {
        let mut state = self.state.write().await;

        let mut free: Vec<(DateTime<Utc>, StockItemId)> = state
            .free_items(key)
            .map(|item| (item.created_at, item.id))
            .collect();
        if free.len() < quantity as usize {
            return Ok(ClaimOutcome::Insufficient {
                available: free.len() as u64,
            });
        }
        free.sort();

        let mut claimed = Vec::with_capacity(quantity as usize);
        for (_, id) in free.into_iter().take(quantity as usize) {
            let item = state
                .items
                .get_mut(&id)
                .ok_or_else(|| StorageError::CorruptRecord(format!("stock item {id} vanished")))?;
            item.assign(request.assignment());
            claimed.push(item.clone());
        }
        Ok(ClaimOutcome::Claimed(claimed))
    }

    async fn assigned_to_order(&self, order_id: OrderId, key: StockKey) -> Result<Vec<StockItem>> {
        let state = self.state.read().await;
        Ok(state
            .items
            .values()
            .filter(|item| {
                item.key == key
                    && item
                        .assignment
                        .as_ref()
                        .is_some_and(|a| a.order_id == Some(order_id))
            })
            .cloned()
            .collect())
    }

    async fn items_for_user(&self, user_id: UserId) -> Result<Vec<StockItem>> {
        let state = self.state.read().await;
        let mut items: Vec<_> = state
            .items
            .values()
            .filter(|item| item.assigned_to() == Some(user_id))
            .cloned()
            .collect();
        items.sort_by_key(|item| {
            std::cmp::Reverse(item.assignment.as_ref().map(|a| a.assigned_at))
        });
        Ok(items)
    }

    async fn get_item(&self, id: StockItemId) -> Result<Option<StockItem>> {
        Ok(self.state.read().await.items.get(&id).cloned())
    }
}

#[async_trait]
impl Catalog for InMemoryStorage {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn save_product(&self, product: Product) -> Result<()> {
        self.state.write().await.products.insert(product.id, product);
        Ok(())
    }

    async fn refresh_stock(&self, key: StockKey) -> Result<u64> {
        let mut state = self.state.write().await;
        let count = state.free_items(key).count() as u64;
        let product = state
            .products
            .get_mut(&key.product_id)
            .ok_or(StorageError::ProductNotFound(key.product_id))?;
        product.set_cached_stock(key.variant_id, count);
        Ok(count)
    }
}

#[async_trait]
impl OrderRepository for InMemoryStorage {
    async fn insert_order(&self, order: Order) -> Result<()> {
        self.state.write().await.orders.insert(order.id(), order);
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn find_by_payment_id(&self, payment_id: &str) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .find(|order| order.payment_id() == Some(payment_id))
            .cloned())
    }

    async fn pending_expired_before(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|order| {
                order.payment_status() == domain::PaymentStatus::Pending
                    && order.expires_at().is_some_and(|at| at <= now)
            })
            .map(Order::id)
            .collect())
    }

    async fn modify<T, F>(&self, id: OrderId, transition: F) -> Result<(T, Order)>
    where
        T: Send,
        F: FnOnce(&mut Order) -> std::result::Result<T, OrderError> + Send,
    {
        let mut state = self.state.write().await;
        let stored = state
            .orders
            .get_mut(&id)
            .ok_or(StorageError::OrderNotFound(id))?;

        let mut updated = stored.clone();
        let value = transition(&mut updated)?;
        *stored = updated.clone();
        Ok((value, updated))
    }
}

#[async_trait]
impl UserDirectory for InMemoryStorage {
    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn save_user(&self, user: User) -> Result<()> {
        self.state.write().await.users.insert(user.id, user);
        Ok(())
    }
}
