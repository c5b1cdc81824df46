//! Assignment engine: claims free stock items and binds them to a user.

use chrono::Utc;
use common::{OrderId, ProductId, UserId, VariantId};
use domain::{AssignedBy, StockItem};
use serde::{Deserialize, Serialize};
use storage::{ClaimOutcome, ClaimRequest, Storage};

use crate::error::{FulfillmentError, Result};
use crate::lookup::CatalogLookup;

/// A request to assign stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignStock {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub user_id: UserId,
    pub quantity: u32,
    pub order_id: Option<OrderId>,
    pub assigned_by: AssignedBy,
}

/// The items handed out by a successful assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub assigned_count: u32,
    /// Free items left for the (product, variant) after the claim.
    pub remaining_stock: u64,
    pub items: Vec<StockItem>,
}

/// Claims stock items for a (product, variant) pair.
///
/// The claim itself is delegated to the ledger, which guarantees it is
/// all-or-nothing and never hands the same item to two callers. The cached
/// counter is recomputed afterwards.
#[derive(Clone)]
pub struct AssignmentEngine<S> {
    lookup: CatalogLookup<S>,
}

impl<S: Storage> AssignmentEngine<S> {
    pub fn new(lookup: CatalogLookup<S>) -> Self {
        Self { lookup }
    }

    pub fn lookup(&self) -> &CatalogLookup<S> {
        &self.lookup
    }

    /// Assigns exactly `quantity` free items to the user or fails without
    /// claiming anything.
    #[tracing::instrument(
        skip(self, request),
        fields(
            product_id = %request.product_id,
            user_id = %request.user_id,
            quantity = request.quantity,
            assigned_by = request.assigned_by.kind(),
        )
    )]
    pub async fn assign_stock(&self, request: AssignStock) -> Result<Assignment> {
        if request.quantity == 0 {
            return Err(FulfillmentError::Validation(
                "quantity must be greater than 0".to_string(),
            ));
        }

        let product = self.lookup.product(request.product_id).await?;
        self.lookup.user(request.user_id).await?;
        let key = product.stock_key(request.variant_id)?;

        let claim = ClaimRequest {
            user_id: request.user_id,
            order_id: request.order_id,
            assigned_by: request.assigned_by,
            assigned_at: Utc::now(),
        };

        let items = match self
            .lookup
            .storage()
            .claim(key, request.quantity, &claim)
            .await?
        {
            ClaimOutcome::Claimed(items) => items,
            ClaimOutcome::Insufficient { available } => {
                metrics::counter!("stock_insufficient_total").increment(1);
                tracing::warn!(
                    %key,
                    available,
                    requested = request.quantity,
                    "insufficient stock"
                );
                return Err(FulfillmentError::InsufficientStock {
                    product_id: request.product_id,
                    variant_id: request.variant_id,
                    available,
                    requested: u64::from(request.quantity),
                });
            }
        };

        let remaining_stock = self.lookup.storage().refresh_stock(key).await?;
        self.lookup.invalidate_product(request.product_id);

        metrics::counter!("stock_assignments_total", "assigned_by" => request.assigned_by.kind())
            .increment(1);
        metrics::counter!("stock_items_claimed_total").increment(items.len() as u64);
        tracing::info!(%key, claimed = items.len(), remaining_stock, "stock assigned");

        Ok(Assignment {
            assigned_count: request.quantity,
            remaining_stock,
            items,
        })
    }
}
