//! Bulk stock import from uploaded code lists.

use chrono::Utc;
use common::{ProductId, VariantId};
use domain::parse_stock_lines;
use serde::Serialize;
use storage::Storage;

use crate::error::{FulfillmentError, Result};
use crate::lookup::CatalogLookup;

/// Counts reported after an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub added: u64,
    pub duplicates: u64,
    /// Free items for the (product, variant) after the import.
    pub current_stock: u64,
}

/// Adds stock items to the ledger and recomputes the cached counter.
#[derive(Clone)]
pub struct StockImporter<S> {
    lookup: CatalogLookup<S>,
}

impl<S: Storage> StockImporter<S> {
    pub fn new(lookup: CatalogLookup<S>) -> Self {
        Self { lookup }
    }

    /// Imports one item per code. Codes are trimmed and blank ones dropped.
    ///
    /// Codes already present for the (product, variant) are reported as
    /// duplicates rather than failing the batch.
    #[tracing::instrument(skip(self, codes), fields(batch = codes.len()))]
    pub async fn bulk_import_stock(
        &self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        codes: Vec<String>,
    ) -> Result<ImportReport> {
        let codes: Vec<String> = codes
            .into_iter()
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty())
            .collect();
        if codes.is_empty() {
            return Err(FulfillmentError::Validation(
                "no stock codes provided".to_string(),
            ));
        }

        let product = self.lookup.product(product_id).await?;
        let key = product.stock_key(variant_id)?;

        let outcome = self
            .lookup
            .storage()
            .import_codes(key, codes, Utc::now())
            .await?;
        let current_stock = self.lookup.storage().refresh_stock(key).await?;
        self.lookup.invalidate_product(product_id);

        metrics::counter!("stock_imported_total").increment(outcome.added);
        tracing::info!(
            %key,
            added = outcome.added,
            duplicates = outcome.duplicates,
            current_stock,
            "stock imported"
        );

        Ok(ImportReport {
            added: outcome.added,
            duplicates: outcome.duplicates,
            current_stock,
        })
    }

    /// Imports a newline-delimited payload, one code per non-blank line.
    pub async fn import_text(
        &self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        payload: &str,
    ) -> Result<ImportReport> {
        self.bulk_import_stock(product_id, variant_id, parse_stock_lines(payload))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Money, Product, StockKey, Variant};
    use storage::{Catalog, InMemoryStorage, StockLedger};

    async fn setup(product: &Product) -> (StockImporter<InMemoryStorage>, InMemoryStorage) {
        let storage = InMemoryStorage::new();
        storage.save_product(product.clone()).await.unwrap();
        let importer = StockImporter::new(CatalogLookup::uncached(storage.clone()));
        (importer, storage)
    }

    #[tokio::test]
    async fn test_import_reports_duplicates_and_current_stock() {
        let product = Product::new("Gift Card", Money::from_cents(500));
        let (importer, storage) = setup(&product).await;

        let first = importer
            .import_text(product.id, None, "OLD-1\nOLD-2\n")
            .await
            .unwrap();
        assert_eq!(first.added, 2);
        assert_eq!(first.current_stock, 2);

        let report = importer
            .import_text(product.id, None, "NEW-1\r\nOLD-1\n\n  NEW-2  \nOLD-2\nNEW-3\n")
            .await
            .unwrap();
        assert_eq!(report.added, 3);
        assert_eq!(report.duplicates, 2);
        assert_eq!(report.current_stock, 5);

        let stored = storage.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 5);
    }

    #[tokio::test]
    async fn test_import_into_variant() {
        let product = Product::new("Game Key", Money::from_cents(1000))
            .with_variant(Variant::new("Deluxe", Money::from_cents(2000)));
        let variant_id = product.variants[0].id;
        let (importer, storage) = setup(&product).await;

        let report = importer
            .bulk_import_stock(product.id, Some(variant_id), vec!["A1".into(), " A2 ".into()])
            .await
            .unwrap();
        assert_eq!(report.added, 2);

        let key = StockKey::variant(product.id, variant_id);
        let codes: Vec<_> = storage
            .items_for_key(key)
            .await
            .into_iter()
            .map(|i| i.code)
            .collect();
        assert_eq!(codes.len(), 2);
        assert!(codes.contains(&"A2".to_string()));
        assert_eq!(storage.count_free(key).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_import_rejects_empty_payload_and_bad_variant() {
        let product = Product::new("Gift Card", Money::from_cents(500));
        let (importer, _storage) = setup(&product).await;

        let empty = importer.import_text(product.id, None, "\n  \n").await;
        assert!(matches!(empty, Err(FulfillmentError::Validation(_))));

        let variant = importer
            .import_text(product.id, Some(VariantId::new()), "X")
            .await;
        assert!(matches!(variant, Err(FulfillmentError::Validation(_))));
    }
}
