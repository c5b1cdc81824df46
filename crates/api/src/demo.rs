//! Demo catalog loaded when the server runs on in-memory storage.
//!
//! Without a database there is no other way to create users or products, so
//! a fresh in-memory server starts with one customer and two stocked products.

use domain::{Money, Product, User, Variant};
use fulfillment::{FulfillmentCoordinator, Result};
use storage::{Catalog, Storage, UserDirectory};

/// The seeded records, with stock counters as stored after the import.
#[derive(Debug, Clone)]
pub struct DemoCatalog {
    pub user: User,
    /// Product without variants.
    pub gift_card: Product,
    /// Product sold only through its variants.
    pub game_key: Product,
}

const GIFT_CARD_CODES: [&str; 3] = ["DEMO-GIFT-0001", "DEMO-GIFT-0002", "DEMO-GIFT-0003"];
const DELUXE_CODES: [&str; 2] = ["DEMO-DELUXE-0001", "DEMO-DELUXE-0002"];

/// Saves the demo customer and products, then imports their codes.
pub async fn seed_demo_catalog<S: Storage>(
    coordinator: &FulfillmentCoordinator<S>,
) -> Result<DemoCatalog> {
    let storage = coordinator.storage();
    let importer = coordinator.importer();

    let user = User::new("Demo Customer", "demo@example.com");
    storage.save_user(user.clone()).await?;

    let gift_card = Product::new("Demo Gift Card", Money::from_cents(2500));
    storage.save_product(gift_card.clone()).await?;
    importer
        .bulk_import_stock(gift_card.id, None, to_codes(&GIFT_CARD_CODES))
        .await?;

    let deluxe = Variant::new("Deluxe", Money::from_cents(12900));
    let deluxe_id = deluxe.id;
    let game_key = Product::new("Demo Game Key", Money::from_cents(9900)).with_variant(deluxe);
    storage.save_product(game_key.clone()).await?;
    importer
        .bulk_import_stock(game_key.id, Some(deluxe_id), to_codes(&DELUXE_CODES))
        .await?;

    let gift_card = storage.get_product(gift_card.id).await?.unwrap_or(gift_card);
    let game_key = storage.get_product(game_key.id).await?.unwrap_or(game_key);
    tracing::info!(
        user_id = %user.id,
        gift_card_id = %gift_card.id,
        game_key_id = %game_key.id,
        deluxe_variant_id = %deluxe_id,
        "seeded demo catalog"
    );
    Ok(DemoCatalog {
        user,
        gift_card,
        game_key,
    })
}

fn to_codes(codes: &[&str]) -> Vec<String> {
    codes.iter().map(|code| code.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fulfillment::{CatalogLookup, CoordinatorConfig, InMemoryPaymentProvider, NoopNotifier};
    use storage::InMemoryStorage;

    use super::*;

    #[tokio::test]
    async fn test_seeded_catalog_is_reachable() {
        let storage = InMemoryStorage::new();
        let coordinator = FulfillmentCoordinator::new(
            CatalogLookup::uncached(storage.clone()),
            Arc::new(InMemoryPaymentProvider::new()),
            Arc::new(NoopNotifier),
            CoordinatorConfig::default(),
        );

        let demo = seed_demo_catalog(&coordinator).await.unwrap();

        let user = storage.get_user(demo.user.id).await.unwrap();
        assert_eq!(user.map(|u| u.email), Some("demo@example.com".to_string()));
        let gift_card = storage.get_product(demo.gift_card.id).await.unwrap().unwrap();
        assert_eq!(gift_card.stock, 3);
        let game_key = storage.get_product(demo.game_key.id).await.unwrap().unwrap();
        assert_eq!(game_key.variants.len(), 1);
        assert_eq!(game_key.variants[0].stock, 2);
    }
}
