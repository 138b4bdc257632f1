//! SQLite backend.
//!
//! Two tables:
//! - `products` — one row per catalog document
//! - `orders` — order documents with the request stored as JSON text and a
//!   unique idempotency key

use async_trait::async_trait;
use chrono::Utc;
use salesdesk_core::error::StoreError;
use salesdesk_core::store::{
    DEFAULT_ORDER_MESSAGE, ORDER_STATUS_CREATED, OrderReceipt, OrderRecord, OrderRequest,
    ProductLookup, ProductQuery, ProductRecord, Store, new_order_id,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Unavailable(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS products (
                product_id  TEXT PRIMARY KEY NOT NULL,
                product     TEXT NOT NULL,
                storage     TEXT NOT NULL DEFAULT '',
                color       TEXT NOT NULL DEFAULT '',
                price       REAL NOT NULL,
                quantity    INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("products table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                order_id         TEXT PRIMARY KEY NOT NULL,
                status           TEXT NOT NULL,
                details          TEXT NOT NULL,
                message          TEXT NOT NULL,
                created_at       TEXT NOT NULL,
                idempotency_key  TEXT UNIQUE NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("orders table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Result<ProductRecord, StoreError> {
        let column = |name: &str, e: sqlx::Error| StoreError::QueryFailed(format!("{name} column: {e}"));
        let quantity: i64 = row.try_get("quantity").map_err(|e| column("quantity", e))?;
        Ok(ProductRecord {
            product_id: row.try_get("product_id").map_err(|e| column("product_id", e))?,
            product: row.try_get("product").map_err(|e| column("product", e))?,
            storage: row.try_get("storage").map_err(|e| column("storage", e))?,
            color: row.try_get("color").map_err(|e| column("color", e))?,
            price: row.try_get("price").map_err(|e| column("price", e))?,
            quantity: u32::try_from(quantity)
                .map_err(|_| StoreError::InvalidRecord(format!("negative quantity {quantity}")))?,
        })
    }

    fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Result<OrderRecord, StoreError> {
        let column = |name: &str, e: sqlx::Error| StoreError::QueryFailed(format!("{name} column: {e}"));
        let details: String = row.try_get("details").map_err(|e| column("details", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| column("created_at", e))?;

        let order_details: OrderRequest = serde_json::from_str(&details)
            .map_err(|e| StoreError::InvalidRecord(format!("order details: {e}")))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(OrderRecord {
            order_id: row.try_get("order_id").map_err(|e| column("order_id", e))?,
            status: row.try_get("status").map_err(|e| column("status", e))?,
            order_details,
            message: row.try_get("message").map_err(|e| column("message", e))?,
            created_at,
        })
    }

    async fn order_by_key(&self, key: &str) -> Result<Option<OrderReceipt>, StoreError> {
        let row = sqlx::query("SELECT order_id, status FROM orders WHERE idempotency_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("order by key: {e}")))?;

        row.map(|row| {
            Ok(OrderReceipt {
                order_id: row
                    .try_get("order_id")
                    .map_err(|e| StoreError::QueryFailed(format!("order_id column: {e}")))?,
                status: row
                    .try_get("status")
                    .map_err(|e| StoreError::QueryFailed(format!("status column: {e}")))?,
                duplicate: true,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_product(&self, query: &ProductQuery) -> Result<ProductLookup, StoreError> {
        // SQLite's LOWER() is ASCII-only, so matching happens here.
        let rows = sqlx::query(
            "SELECT product_id, product, storage, color, price, quantity FROM products \
             ORDER BY CAST(product_id AS INTEGER), product_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("products: {e}")))?;

        let mut matches = Vec::new();
        for row in &rows {
            let product = Self::row_to_product(row)?;
            if query.matches(&product) {
                matches.push(product);
            }
        }
        Ok(ProductLookup::from_matches(query, matches))
    }

    async fn create_order(
        &self,
        request: &OrderRequest,
        idempotency_key: &str,
    ) -> Result<OrderReceipt, StoreError> {
        if let Some(existing) = self.order_by_key(idempotency_key).await? {
            debug!(order_id = %existing.order_id, "Duplicate order request");
            return Ok(existing);
        }

        let order_id = new_order_id();
        let details = serde_json::to_string(request)
            .map_err(|e| StoreError::InvalidRecord(format!("order details: {e}")))?;
        let message = request.message.as_deref().unwrap_or(DEFAULT_ORDER_MESSAGE);

        let result = sqlx::query(
            "INSERT INTO orders (order_id, status, details, message, created_at, idempotency_key) \
             VALUES (?, ?, ?, ?, ?, ?) ON CONFLICT(idempotency_key) DO NOTHING",
        )
        .bind(&order_id)
        .bind(ORDER_STATUS_CREATED)
        .bind(&details)
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .bind(idempotency_key)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("insert order: {e}")))?;

        if result.rows_affected() == 0 {
            // Lost a race with a concurrent insert of the same key.
            return self.order_by_key(idempotency_key).await?.ok_or_else(|| {
                StoreError::QueryFailed("order vanished after key conflict".into())
            });
        }

        Ok(OrderReceipt {
            order_id,
            status: ORDER_STATUS_CREATED.to_string(),
            duplicate: false,
        })
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT order_id, status, details, message, created_at FROM orders WHERE order_id = ?",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("get order: {e}")))?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn upsert_products(&self, products: &[ProductRecord]) -> Result<usize, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::QueryFailed(format!("begin: {e}")))?;

        for p in products {
            sqlx::query(
                "INSERT INTO products (product_id, product, storage, color, price, quantity) \
                 VALUES (?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(product_id) DO UPDATE SET product = excluded.product, \
                 storage = excluded.storage, color = excluded.color, \
                 price = excluded.price, quantity = excluded.quantity",
            )
            .bind(&p.product_id)
            .bind(&p.product)
            .bind(&p.storage)
            .bind(&p.color)
            .bind(p.price)
            .bind(i64::from(p.quantity))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("upsert {}: {e}", p.product_id)))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::QueryFailed(format!("commit: {e}")))?;
        Ok(products.len())
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed_catalog;
    use salesdesk_core::store::{CustomerInfo, StockStatus};

    async fn test_store(dir: &tempfile::TempDir) -> SqliteStore {
        let path = dir.path().join("salesdesk.db");
        let store = SqliteStore::new(&format!("sqlite://{}", path.display()))
            .await
            .unwrap();
        store.upsert_products(&seed_catalog()).await.unwrap();
        store
    }

    fn order(name: &str) -> OrderRequest {
        OrderRequest {
            product: "Dell XPS 13".into(),
            storage: None,
            color: Some("Black".into()),
            quantity: 2,
            total_price: Some(49_980_000.0),
            customer_info: CustomerInfo {
                customer_name: name.into(),
                conversation_id: Some("sess-1".into()),
            },
            message: None,
        }
    }

    #[tokio::test]
    async fn product_lookup_matches_unicode_color() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let lookup = store
            .get_product(&ProductQuery::new("iPhone 15 Pro Max").with_color("TITAN TỰ NHIÊN"))
            .await
            .unwrap();
        assert!(lookup.found);
        assert_eq!(lookup.quantity, Some(3));
        assert_eq!(lookup.stock_status, StockStatus::InStock);
    }

    #[tokio::test]
    async fn substring_lookup_returns_ordered_matches() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let lookup = store.get_product(&ProductQuery::new("iphone")).await.unwrap();
        let ids: Vec<_> = lookup.products.iter().map(|p| p.product_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn order_roundtrip_and_idempotency() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let first = store.create_order(&order("An"), "key-1").await.unwrap();
        assert!(!first.duplicate);
        let again = store.create_order(&order("An"), "key-1").await.unwrap();
        assert!(again.duplicate);
        assert_eq!(first.order_id, again.order_id);

        let stored = store.get_order(&first.order_id).await.unwrap().unwrap();
        assert_eq!(stored.order_details.customer_info.customer_name, "An");
        assert_eq!(stored.status, "created");
        assert_eq!(stored.message, "Order created.");
    }

    #[tokio::test]
    async fn missing_order_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        assert!(store.get_order("order_0000000000000000").await.unwrap().is_none());
        assert!(store.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn reseeding_does_not_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        store.upsert_products(&seed_catalog()).await.unwrap();
        let lookup = store.get_product(&ProductQuery::new("Dell")).await.unwrap();
        assert_eq!(lookup.products.len(), 1);
    }
}
