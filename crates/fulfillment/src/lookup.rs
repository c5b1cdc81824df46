//! Cached product and user lookups shared by the fulfillment services.

use std::sync::Arc;
use std::time::Duration;

use common::{ProductId, UserId};
use domain::{Product, User};
use storage::Storage;

use crate::cache::{Cache, NoopCache};
use crate::error::{FulfillmentError, Result};

/// Resolves products and users through injected caches.
#[derive(Clone)]
pub struct CatalogLookup<S> {
    storage: S,
    products: Arc<dyn Cache<ProductId, Product>>,
    users: Arc<dyn Cache<UserId, User>>,
    ttl: Duration,
}

impl<S: Storage> CatalogLookup<S> {
    /// Creates a lookup that always reads through to storage.
    pub fn uncached(storage: S) -> Self {
        Self::new(storage, Arc::new(NoopCache), Arc::new(NoopCache), Duration::ZERO)
    }

    pub fn new(
        storage: S,
        products: Arc<dyn Cache<ProductId, Product>>,
        users: Arc<dyn Cache<UserId, User>>,
        ttl: Duration,
    ) -> Self {
        Self {
            storage,
            products,
            users,
            ttl,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Loads a product, failing with `NotFound` when it does not exist.
    pub async fn product(&self, id: ProductId) -> Result<Product> {
        if let Some(product) = self.products.get(&id) {
            return Ok(product);
        }
        let product = self
            .storage
            .get_product(id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("product", id))?;
        self.products.set(id, product.clone(), self.ttl);
        Ok(product)
    }

    /// Loads a user, failing with `NotFound` when it does not exist.
    pub async fn user(&self, id: UserId) -> Result<User> {
        if let Some(user) = self.users.get(&id) {
            return Ok(user);
        }
        let user = self
            .storage
            .get_user(id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("user", id))?;
        self.users.set(id, user.clone(), self.ttl);
        Ok(user)
    }

    /// Drops the cached product so the next lookup sees fresh stock counters.
    pub fn invalidate_product(&self, id: ProductId) {
        self.products.invalidate(&id);
    }
}
