use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AdminId, OrderId, ProductId, StockItemId, UserId, VariantId};
use domain::{
    AssignedBy, Money, Order, OrderError, Product, StockAssignment, StockItem, StockKey, User,
    Variant,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::store::{
    Catalog, ClaimOutcome, ClaimRequest, ImportOutcome, OrderRepository, StockLedger,
    UserDirectory, dedupe_batch,
};
use crate::{Result, StorageError};

const ITEM_COLUMNS: &str = "id, product_id, variant_id, code, is_used, assigned_to, assigned_at, \
                            order_id, assigned_by, assigned_by_admin, created_at";

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Creates a new PostgreSQL storage.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_item(row: &PgRow) -> Result<StockItem> {
        let id: Uuid = row.try_get("id")?;
        let is_used: bool = row.try_get("is_used")?;

        let assignment = if is_used {
            let user_id: Option<Uuid> = row.try_get("assigned_to")?;
            let assigned_at: Option<DateTime<Utc>> = row.try_get("assigned_at")?;
            let order_id: Option<Uuid> = row.try_get("order_id")?;
            let kind: Option<String> = row.try_get("assigned_by")?;
            let admin_id: Option<Uuid> = row.try_get("assigned_by_admin")?;

            let assigned_by = match (kind.as_deref(), admin_id) {
                (Some("system"), _) => AssignedBy::System,
                (Some("admin"), Some(admin_id)) => AssignedBy::Admin(AdminId::from_uuid(admin_id)),
                _ => {
                    return Err(StorageError::CorruptRecord(format!(
                        "stock item {id} has invalid assigned_by"
                    )));
                }
            };
            let (Some(user_id), Some(assigned_at)) = (user_id, assigned_at) else {
                return Err(StorageError::CorruptRecord(format!(
                    "stock item {id} is used but not assigned"
                )));
            };

            Some(StockAssignment {
                user_id: UserId::from_uuid(user_id),
                assigned_at,
                order_id: order_id.map(OrderId::from_uuid),
                assigned_by,
            })
        } else {
            None
        };

        Ok(StockItem {
            id: StockItemId::from_uuid(id),
            key: StockKey {
                product_id: ProductId::from_uuid(row.try_get("product_id")?),
                variant_id: row
                    .try_get::<Option<Uuid>, _>("variant_id")?
                    .map(VariantId::from_uuid),
            },
            code: row.try_get("code")?,
            assignment,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let document: serde_json::Value = row.try_get("document")?;
        Ok(serde_json::from_value(document)?)
    }

    async fn write_order(
        conn: &mut sqlx::PgConnection,
        order: &Order,
    ) -> Result<()> {
        let document = serde_json::to_value(order)?;
        sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = $2, order_status = $3, payment_id = $4, expires_at = $5,
                product_assigned = $6, document = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.payment_status().as_str())
        .bind(order.order_status().as_str())
        .bind(order.payment_id())
        .bind(order.expires_at())
        .bind(order.product_assigned())
        .bind(document)
        .bind(order.updated_at())
        .execute(conn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StockLedger for PostgresStorage {
    #[tracing::instrument(skip(self, codes), fields(%key, batch = codes.len()))]
    async fn import_codes(
        &self,
        key: StockKey,
        codes: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<ImportOutcome> {
        let (unique, repeats) = dedupe_batch(codes);
        if unique.is_empty() {
            return Ok(ImportOutcome {
                added: 0,
                duplicates: repeats,
            });
        }
        let ids: Vec<Uuid> = unique.iter().map(|_| Uuid::new_v4()).collect();
        let submitted = unique.len() as u64;

        let result = sqlx::query(
            r#"
            INSERT INTO stock_items (id, product_id, variant_id, code, created_at)
            SELECT t.id, $3::uuid, $4::uuid, t.code, $5::timestamptz
            FROM UNNEST($1::uuid[], $2::text[]) AS t(id, code)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&ids)
        .bind(&unique)
        .bind(key.product_id.as_uuid())
        .bind(key.variant_id.map(|v| v.as_uuid()))
        .bind(now)
        .execute(&self.pool)
        .await?;

        let added = result.rows_affected();
        Ok(ImportOutcome {
            added,
            duplicates: repeats + (submitted - added),
        })
    }

    async fn count_free(&self, key: StockKey) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM stock_items
            WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2 AND NOT is_used
            "#,
        )
        .bind(key.product_id.as_uuid())
        .bind(key.variant_id.map(|v| v.as_uuid()))
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    #[tracing::instrument(skip(self, request), fields(%key))]
    async fn claim(
        &self,
        key: StockKey,
        quantity: u32,
        request: &ClaimRequest,
    ) -> Result<ClaimOutcome> {
        let mut tx = self.pool.begin().await?;

        // Rows locked by a concurrent claim are skipped, never shared.
        let sql = format!(
            r#"
            WITH picked AS (
                SELECT id FROM stock_items
                WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2 AND NOT is_used
                ORDER BY created_at, id
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            UPDATE stock_items AS s
            SET is_used = TRUE, assigned_to = $4, assigned_at = $5, order_id = $6,
                assigned_by = $7, assigned_by_admin = $8
            FROM picked
            WHERE s.id = picked.id
            RETURNING {}
            "#,
            ITEM_COLUMNS
                .split(", ")
                .map(|c| format!("s.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let rows = sqlx::query(&sql)
            .bind(key.product_id.as_uuid())
            .bind(key.variant_id.map(|v| v.as_uuid()))
            .bind(i64::from(quantity))
            .bind(request.user_id.as_uuid())
            .bind(request.assigned_at)
            .bind(request.order_id.map(|o| o.as_uuid()))
            .bind(request.assigned_by.kind())
            .bind(request.assigned_by.admin_id().map(|a| a.as_uuid()))
            .fetch_all(&mut *tx)
            .await?;

        if rows.len() < quantity as usize {
            tx.rollback().await?;
            metrics::counter!("stock_claim_shortfall_total").increment(1);
            let available = self.count_free(key).await?;
            return Ok(ClaimOutcome::Insufficient { available });
        }

        let items = rows
            .iter()
            .map(Self::row_to_item)
            .collect::<Result<Vec<_>>>()?;
        tx.commit().await?;
        Ok(ClaimOutcome::Claimed(items))
    }

    async fn assigned_to_order(&self, order_id: OrderId, key: StockKey) -> Result<Vec<StockItem>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM stock_items
            WHERE order_id = $1 AND product_id = $2 AND variant_id IS NOT DISTINCT FROM $3
            ORDER BY assigned_at ASC, id ASC
            "#
        ))
        .bind(order_id.as_uuid())
        .bind(key.product_id.as_uuid())
        .bind(key.variant_id.map(|v| v.as_uuid()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }

    async fn items_for_user(&self, user_id: UserId) -> Result<Vec<StockItem>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM stock_items
            WHERE assigned_to = $1
            ORDER BY assigned_at DESC
            "#
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }

    async fn get_item(&self, id: StockItemId) -> Result<Option<StockItem>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM stock_items WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_item).transpose()
    }
}

#[async_trait]
impl Catalog for PostgresStorage {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, price_cents, stock, created_at FROM products WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let variant_rows = sqlx::query(
            r#"
            SELECT id, name, price_cents, stock FROM variants
            WHERE product_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let variants = variant_rows
            .iter()
            .map(|v| {
                Ok(Variant {
                    id: VariantId::from_uuid(v.try_get("id")?),
                    name: v.try_get("name")?,
                    price: Money::from_cents(v.try_get("price_cents")?),
                    stock: v.try_get::<i64, _>("stock")? as u64,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Product {
            id,
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock: row.try_get::<i64, _>("stock")? as u64,
            variants,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn save_product(&self, product: Product) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, stock, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                stock = EXCLUDED.stock
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.stock as i64)
        .bind(product.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, variant) in product.variants.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO variants (id, product_id, name, price_cents, stock, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    price_cents = EXCLUDED.price_cents,
                    stock = EXCLUDED.stock,
                    position = EXCLUDED.position
                "#,
            )
            .bind(variant.id.as_uuid())
            .bind(product.id.as_uuid())
            .bind(&variant.name)
            .bind(variant.price.cents())
            .bind(variant.stock as i64)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(%key))]
    async fn refresh_stock(&self, key: StockKey) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        // Lock the counter row first so the recount below starts after any
        // competing refresh has committed.
        let locked = match key.variant_id {
            Some(variant_id) => {
                sqlx::query("SELECT id FROM variants WHERE id = $1 AND product_id = $2 FOR UPDATE")
                    .bind(variant_id.as_uuid())
                    .bind(key.product_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?
            }
            None => {
                sqlx::query("SELECT id FROM products WHERE id = $1 FOR UPDATE")
                    .bind(key.product_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?
            }
        };
        if locked.is_none() {
            return Err(StorageError::ProductNotFound(key.product_id));
        }

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM stock_items
            WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2 AND NOT is_used
            "#,
        )
        .bind(key.product_id.as_uuid())
        .bind(key.variant_id.map(|v| v.as_uuid()))
        .fetch_one(&mut *tx)
        .await?;

        match key.variant_id {
            Some(variant_id) => {
                sqlx::query("UPDATE variants SET stock = $2 WHERE id = $1")
                    .bind(variant_id.as_uuid())
                    .bind(count)
                    .execute(&mut *tx)
                    .await?;
            }
            None => {
                sqlx::query("UPDATE products SET stock = $2 WHERE id = $1")
                    .bind(key.product_id.as_uuid())
                    .bind(count)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl OrderRepository for PostgresStorage {
    async fn insert_order(&self, order: Order) -> Result<()> {
        let document = serde_json::to_value(&order)?;
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, payment_status, order_status, payment_id, expires_at,
                                product_assigned, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.user_id().as_uuid())
        .bind(order.payment_status().as_str())
        .bind(order.order_status().as_str())
        .bind(order.payment_id())
        .bind(order.expires_at())
        .bind(order.product_assigned())
        .bind(document)
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT document FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn find_by_payment_id(&self, payment_id: &str) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT document FROM orders WHERE payment_id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn pending_expired_before(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM orders
            WHERE payment_status = 'pending' AND expires_at <= $1
            ORDER BY expires_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(OrderId::from_uuid).collect())
    }

    async fn modify<T, F>(&self, id: OrderId, transition: F) -> Result<(T, Order)>
    where
        T: Send,
        F: FnOnce(&mut Order) -> std::result::Result<T, OrderError> + Send,
    {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT document FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StorageError::OrderNotFound(id))?;
        let original = Self::row_to_order(&row)?;

        let mut updated = original.clone();
        let value = transition(&mut updated)?;

        if updated != original {
            Self::write_order(&mut tx, &updated).await?;
        }
        tx.commit().await?;

        Ok((value, updated))
    }
}

#[async_trait]
impl UserDirectory for PostgresStorage {
    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, email FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(User {
                id,
                name: row.try_get("name")?,
                email: row.try_get("email")?,
            })),
            None => Ok(None),
        }
    }

    async fn save_user(&self, user: User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, email = EXCLUDED.email
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
