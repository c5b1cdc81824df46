use chrono::Utc;
use common::UserId;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use domain::{AssignedBy, Money, Product, StockKey};
use storage::{Catalog, ClaimRequest, InMemoryStorage, StockLedger};
use tokio::runtime::Runtime;

fn seeded(rt: &Runtime, codes: usize) -> (InMemoryStorage, StockKey) {
    rt.block_on(async {
        let storage = InMemoryStorage::new();
        let product = Product::new("Bench", Money::from_cents(100));
        let key = StockKey::product(product.id);
        storage.save_product(product).await.unwrap();
        let batch = (0..codes).map(|i| format!("CODE-{i}")).collect();
        storage.import_codes(key, batch, Utc::now()).await.unwrap();
        (storage, key)
    })
}

fn bench_import(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("storage/import_1k_codes", |b| {
        b.iter_batched(
            || {
                let batch: Vec<String> = (0..1_000).map(|i| format!("CODE-{i}")).collect();
                (InMemoryStorage::new(), batch)
            },
            |(storage, batch)| {
                rt.block_on(async {
                    let key = StockKey::product(common::ProductId::new());
                    storage.import_codes(key, batch, Utc::now()).await.unwrap()
                })
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_claim(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("storage/claim_5_of_1k", |b| {
        b.iter_batched(
            || seeded(&rt, 1_000),
            |(storage, key)| {
                rt.block_on(async {
                    let request = ClaimRequest {
                        user_id: UserId::new(),
                        order_id: None,
                        assigned_by: AssignedBy::System,
                        assigned_at: Utc::now(),
                    };
                    storage.claim(key, 5, &request).await.unwrap()
                })
            },
            BatchSize::SmallInput,
        );
    });

    c.bench_function("storage/refresh_stock_1k", |b| {
        let (storage, key) = seeded(&rt, 1_000);
        b.iter(|| rt.block_on(storage.refresh_stock(key)).unwrap());
    });
}

criterion_group!(benches, bench_import, bench_claim);
criterion_main!(benches);
