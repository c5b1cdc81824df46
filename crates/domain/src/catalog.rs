//! Products, variants and customers.

use chrono::{DateTime, Utc};
use common::{ProductId, UserId, VariantId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;
use crate::stock::StockKey;

/// Errors raised when resolving a stock key against a product.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The product has variants but none was given.
    #[error("Product {product_id} has variants; a variant ID is required")]
    VariantRequired { product_id: ProductId },

    /// The given variant does not belong to the product.
    #[error("Variant {variant_id} not found on product {product_id}")]
    VariantNotFound {
        product_id: ProductId,
        variant_id: VariantId,
    },

    /// A variant was given for a product without variants.
    #[error("Product {product_id} has no variants")]
    VariantNotAllowed { product_id: ProductId },
}

/// A sellable option of a product with its own price and stock counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub name: String,
    pub price: Money,
    /// Cached count of free stock items for this variant.
    pub stock: u64,
}

impl Variant {
    pub fn new(name: impl Into<String>, price: Money) -> Self {
        Self {
            id: VariantId::new(),
            name: name.into(),
            price,
            stock: 0,
        }
    }
}

/// A product in the catalog.
///
/// `stock` (or `Variant::stock` when the product has variants) is a cache of
/// the number of free stock items. It is only ever overwritten by a recount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: u64,
    #[serde(default)]
    pub variants: Vec<Variant>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Creates a product without variants.
    pub fn new(name: impl Into<String>, price: Money) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            price,
            stock: 0,
            variants: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Adds a variant (builder style).
    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }

    pub fn has_variants(&self) -> bool {
        !self.variants.is_empty()
    }

    pub fn variant(&self, variant_id: VariantId) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    /// Resolves the ledger key for an optional variant.
    ///
    /// Products with variants require an existing variant; products without
    /// variants reject one.
    pub fn stock_key(&self, variant_id: Option<VariantId>) -> Result<StockKey, CatalogError> {
        match (self.has_variants(), variant_id) {
            (true, None) => Err(CatalogError::VariantRequired {
                product_id: self.id,
            }),
            (true, Some(variant_id)) => {
                if self.variant(variant_id).is_none() {
                    return Err(CatalogError::VariantNotFound {
                        product_id: self.id,
                        variant_id,
                    });
                }
                Ok(StockKey::variant(self.id, variant_id))
            }
            (false, Some(_)) => Err(CatalogError::VariantNotAllowed {
                product_id: self.id,
            }),
            (false, None) => Ok(StockKey::product(self.id)),
        }
    }

    /// Unit price for the key's variant, or the product price.
    pub fn price_for(&self, variant_id: Option<VariantId>) -> Money {
        variant_id
            .and_then(|id| self.variant(id))
            .map(|v| v.price)
            .unwrap_or(self.price)
    }

    /// Display name including the variant, e.g. `"Game Pass - 3 months"`.
    pub fn display_name(&self, variant_id: Option<VariantId>) -> String {
        match variant_id.and_then(|id| self.variant(id)) {
            Some(variant) => format!("{} - {}", self.name, variant.name),
            None => self.name.clone(),
        }
    }

    /// Cached stock for the key's variant, or the product counter.
    pub fn cached_stock(&self, variant_id: Option<VariantId>) -> u64 {
        match variant_id.and_then(|id| self.variant(id)) {
            Some(variant) => variant.stock,
            None => self.stock,
        }
    }

    /// Overwrites the cached counter for a variant or the product.
    pub fn set_cached_stock(&mut self, variant_id: Option<VariantId>, count: u64) {
        match variant_id.and_then(|id| self.variants.iter_mut().find(|v| v.id == id)) {
            Some(variant) => variant.stock = count,
            None => self.stock = count,
        }
    }
}

/// A customer account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            email: email.into(),
        }
    }
}
