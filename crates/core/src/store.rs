//! Store trait — the document store behind the inventory and order tools.
//!
//! The pipeline never talks to a database directly. It sees three
//! operations (product lookup, order creation, order retrieval) through a
//! shared, thread-safe handle created once at startup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::StoreError;

/// Quantity at or below which stock is reported as low.
pub const LOW_STOCK_THRESHOLD: u32 = 2;

/// A product lookup. Empty `storage`/`color` mean "any".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductQuery {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl ProductQuery {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage: None,
            color: None,
        }
    }

    pub fn with_storage(mut self, storage: impl Into<String>) -> Self {
        self.storage = Some(storage.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Case-insensitive match: the name is a substring match, storage and
    /// color (when given and non-blank) must be equal ignoring case.
    pub fn matches(&self, product: &ProductRecord) -> bool {
        let name = self.name.trim().to_lowercase();
        if name.is_empty() || !product.product.to_lowercase().contains(&name) {
            return false;
        }
        let filter_eq = |filter: &Option<String>, value: &str| match filter.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(wanted) => wanted.to_lowercase() == value.trim().to_lowercase(),
        };
        filter_eq(&self.storage, &product.storage) && filter_eq(&self.color, &product.color)
    }
}

/// A catalog document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: String,
    pub product: String,
    pub storage: String,
    pub color: String,
    /// Unit price in VND
    pub price: f64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
    NotChecked,
}

impl StockStatus {
    pub fn from_quantity(quantity: u32) -> Self {
        match quantity {
            0 => StockStatus::OutOfStock,
            q if q <= LOW_STOCK_THRESHOLD => StockStatus::LowStock,
            _ => StockStatus::InStock,
        }
    }
}

/// The answer to a [`ProductQuery`]. `found: false` is a business result,
/// not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductLookup {
    pub found: bool,

    pub stock_status: StockStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub products: Vec<ProductRecord>,

    /// Price of the best match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,

    /// Remaining quantity of the best match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProductLookup {
    /// Build a lookup from the matching records, best match first.
    pub fn from_matches(query: &ProductQuery, products: Vec<ProductRecord>) -> Self {
        match products.first() {
            None => Self {
                found: false,
                stock_status: StockStatus::NotChecked,
                products: Vec::new(),
                price: None,
                quantity: None,
                message: Some(format!(
                    "No product found matching product='{}', storage='{}', color='{}'",
                    query.name,
                    query.storage.as_deref().filter(|s| !s.is_empty()).unwrap_or("any"),
                    query.color.as_deref().filter(|s| !s.is_empty()).unwrap_or("any"),
                )),
            },
            Some(best) => Self {
                found: true,
                stock_status: StockStatus::from_quantity(best.quantity),
                price: Some(best.price),
                quantity: Some(best.quantity),
                message: None,
                products,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerInfo {
    #[serde(default = "default_customer_name")]
    pub customer_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

fn default_customer_name() -> String {
    "Guest".into()
}

impl Default for CustomerInfo {
    fn default() -> Self {
        Self {
            customer_name: default_customer_name(),
            conversation_id: None,
        }
    }
}

fn default_quantity() -> u32 {
    1
}

/// A validated order, ready for the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub product: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default = "default_quantity")]
    pub quantity: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_price: Option<f64>,

    pub customer_info: CustomerInfo,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A stored order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub status: String,
    pub order_details: OrderRequest,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// What `create_order` hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub status: String,
    /// True when the idempotency key matched an existing order
    #[serde(default)]
    pub duplicate: bool,
}

pub const ORDER_STATUS_CREATED: &str = "created";
pub const DEFAULT_ORDER_MESSAGE: &str = "Order created.";

/// Generate an order id: `order_` followed by 16 lowercase hex chars.
pub fn new_order_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("order_{}", &hex[..16])
}

/// The core Store trait.
///
/// Implementations must be safe to share across concurrent requests.
#[async_trait]
pub trait Store: Send + Sync {
    /// Backend name ("memory", "sqlite", ...).
    fn name(&self) -> &str;

    /// Find products matching the query.
    async fn get_product(&self, query: &ProductQuery) -> std::result::Result<ProductLookup, StoreError>;

    /// Persist an order. A repeated `idempotency_key` returns the existing
    /// order with `duplicate: true` instead of writing a second one.
    async fn create_order(
        &self,
        request: &OrderRequest,
        idempotency_key: &str,
    ) -> std::result::Result<OrderReceipt, StoreError>;

    /// Fetch an order by id.
    async fn get_order(&self, order_id: &str) -> std::result::Result<Option<OrderRecord>, StoreError>;

    /// Insert or replace catalog documents.
    async fn upsert_products(&self, products: &[ProductRecord]) -> std::result::Result<usize, StoreError>;

    /// Can we reach the store?
    async fn health_check(&self) -> std::result::Result<bool, StoreError> {
        Ok(true)
    }
}
