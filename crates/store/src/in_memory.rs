//! In-memory store — the default backend for demos and tests.

use async_trait::async_trait;
use chrono::Utc;
use salesdesk_core::error::StoreError;
use salesdesk_core::store::{
    DEFAULT_ORDER_MESSAGE, ORDER_STATUS_CREATED, OrderReceipt, OrderRecord, OrderRequest,
    ProductLookup, ProductQuery, ProductRecord, Store, new_order_id,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct OrderBook {
    orders: HashMap<String, OrderRecord>,
    /// idempotency key -> order id
    by_key: HashMap<String, String>,
}

/// Catalog and orders held in process memory. Lost on exit.
pub struct InMemoryStore {
    products: Arc<RwLock<Vec<ProductRecord>>>,
    orders: Arc<RwLock<OrderBook>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            products: Arc::new(RwLock::new(Vec::new())),
            orders: Arc::new(RwLock::new(OrderBook::default())),
        }
    }

    /// A store preloaded with `products`.
    pub fn with_products(products: Vec<ProductRecord>) -> Self {
        Self {
            products: Arc::new(RwLock::new(products)),
            orders: Arc::new(RwLock::new(OrderBook::default())),
        }
    }

    /// Insert or replace catalog documents.
    pub async fn seed(&self, products: &[ProductRecord]) -> usize {
        let mut current = self.products.write().await;
        for record in products {
            match current.iter_mut().find(|p| p.product_id == record.product_id) {
                Some(slot) => *slot = record.clone(),
                None => current.push(record.clone()),
            }
        }
        products.len()
    }

    pub async fn order_count(&self) -> usize {
        self.orders.read().await.orders.len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_product(&self, query: &ProductQuery) -> Result<ProductLookup, StoreError> {
        let products = self.products.read().await;
        let matches: Vec<ProductRecord> = products
            .iter()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        Ok(ProductLookup::from_matches(query, matches))
    }

    async fn create_order(
        &self,
        request: &OrderRequest,
        idempotency_key: &str,
    ) -> Result<OrderReceipt, StoreError> {
        let mut book = self.orders.write().await;

        if let Some(existing) = book
            .by_key
            .get(idempotency_key)
            .and_then(|id| book.orders.get(id))
        {
            return Ok(OrderReceipt {
                order_id: existing.order_id.clone(),
                status: existing.status.clone(),
                duplicate: true,
            });
        }

        let record = OrderRecord {
            order_id: new_order_id(),
            status: ORDER_STATUS_CREATED.to_string(),
            order_details: request.clone(),
            message: request
                .message
                .clone()
                .unwrap_or_else(|| DEFAULT_ORDER_MESSAGE.to_string()),
            created_at: Utc::now(),
        };
        let receipt = OrderReceipt {
            order_id: record.order_id.clone(),
            status: record.status.clone(),
            duplicate: false,
        };

        book.by_key
            .insert(idempotency_key.to_string(), record.order_id.clone());
        book.orders.insert(record.order_id.clone(), record);
        Ok(receipt)
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        Ok(self.orders.read().await.orders.get(order_id).cloned())
    }

    async fn upsert_products(&self, products: &[ProductRecord]) -> Result<usize, StoreError> {
        Ok(self.seed(products).await)
    }
}
