//! Serialized stock items and the ledger partition key.

use chrono::{DateTime, Utc};
use common::{AdminId, OrderId, ProductId, StockItemId, UserId, VariantId};
use serde::{Deserialize, Serialize};

/// The (product, variant) pair that partitions the stock ledger.
///
/// Variant-less products use `variant_id: None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
}

impl StockKey {
    /// Key for a product without variants.
    pub fn product(product_id: ProductId) -> Self {
        Self {
            product_id,
            variant_id: None,
        }
    }

    /// Key for a specific variant of a product.
    pub fn variant(product_id: ProductId, variant_id: VariantId) -> Self {
        Self {
            product_id,
            variant_id: Some(variant_id),
        }
    }
}

impl std::fmt::Display for StockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.variant_id {
            Some(variant_id) => write!(f, "{}/{}", self.product_id, variant_id),
            None => write!(f, "{}", self.product_id),
        }
    }
}

/// Who performed a stock assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "admin_id", rename_all = "snake_case")]
pub enum AssignedBy {
    /// Automatic assignment from payment confirmation.
    System,
    /// Manual assignment from the back-office.
    Admin(AdminId),
}

impl AssignedBy {
    /// Returns the kind as a string (`"system"` or `"admin"`).
    pub fn kind(&self) -> &'static str {
        match self {
            AssignedBy::System => "system",
            AssignedBy::Admin(_) => "admin",
        }
    }

    /// Returns the admin ID for manual assignments.
    pub fn admin_id(&self) -> Option<AdminId> {
        match self {
            AssignedBy::System => None,
            AssignedBy::Admin(id) => Some(*id),
        }
    }
}

impl std::fmt::Display for AssignedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignedBy::System => write!(f, "system"),
            AssignedBy::Admin(id) => write!(f, "admin:{id}"),
        }
    }
}

/// Binding of a stock item to its buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAssignment {
    pub user_id: UserId,
    pub assigned_at: DateTime<Utc>,
    pub order_id: Option<OrderId>,
    pub assigned_by: AssignedBy,
}

/// One sellable unit: a redeemable code.
///
/// An item is either free (`assignment == None`) or assigned. It moves from
/// free to assigned exactly once and is never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: StockItemId,
    pub key: StockKey,
    pub code: String,
    pub assignment: Option<StockAssignment>,
    pub created_at: DateTime<Utc>,
}

impl StockItem {
    /// Creates a free stock item.
    pub fn new(key: StockKey, code: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: StockItemId::new(),
            key,
            code: code.into(),
            assignment: None,
            created_at,
        }
    }

    /// Returns true once the item has been assigned.
    pub fn is_used(&self) -> bool {
        self.assignment.is_some()
    }

    /// Returns the user the item is assigned to.
    pub fn assigned_to(&self) -> Option<UserId> {
        self.assignment.as_ref().map(|a| a.user_id)
    }

    /// Marks the item as assigned. Returns false if it was already taken.
    pub fn assign(&mut self, assignment: StockAssignment) -> bool {
        if self.assignment.is_some() {
            return false;
        }
        self.assignment = Some(assignment);
        true
    }
}

/// Splits an uploaded newline-delimited payload into stock codes.
///
/// Every line is trimmed; blank lines are dropped. Duplicates are kept so the
/// importer can report them.
pub fn parse_stock_lines(payload: &str) -> Vec<String> {
    payload
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
