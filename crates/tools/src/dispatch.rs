//! Tool dispatcher — maps a [`ToolCall`] onto a store operation.
//!
//! Every outcome is a [`ToolResult`]: unknown names, bad arguments and
//! upstream failures are reported as values so the turn loop can feed them
//! back to the model.

use crate::retry::{RetryExhausted, RetryPolicy};
use chrono::Utc;
use salesdesk_core::error::StoreError;
use salesdesk_core::event::{DomainEvent, EventBus};
use salesdesk_core::store::{OrderRequest, ProductQuery, Store};
use salesdesk_core::tool::{DispatchErrorKind, ToolCall, ToolKind, ToolResult};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Arguments of `check_inventory_detail`. Blank filters mean "any".
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryLookupArgs {
    #[serde(alias = "product")]
    pub name: String,
    #[serde(default)]
    pub storage: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl InventoryLookupArgs {
    fn into_query(self) -> ProductQuery {
        let non_blank = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        ProductQuery {
            name: self.name.trim().to_string(),
            storage: non_blank(self.storage),
            color: non_blank(self.color),
        }
    }
}

/// Arguments of `get_order`.
#[derive(Debug, Clone, Deserialize)]
pub struct GetOrderArgs {
    pub order_id: String,
}

/// Arguments of `create_customer_order`: the order either flat or wrapped
/// in `order_details` (an object, or a JSON string encoding one).
#[derive(Debug, Clone)]
pub struct OrderArgs(pub OrderRequest);

const REQUIRED_ORDER_FIELDS: [&str; 2] = ["product", "customer_info"];

impl OrderArgs {
    pub fn parse(arguments: &Map<String, Value>) -> Result<Self, String> {
        let details = match arguments.get("order_details") {
            None => arguments.clone(),
            Some(Value::Object(map)) => map.clone(),
            Some(Value::String(encoded)) => match serde_json::from_str::<Value>(encoded) {
                Ok(Value::Object(map)) => map,
                _ => return Err("order_details is not a JSON object".into()),
            },
            Some(_) => return Err("order_details must be an object".into()),
        };

        let missing: Vec<&str> = REQUIRED_ORDER_FIELDS
            .into_iter()
            .filter(|field| details.get(*field).is_none_or(Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing required fields: {}", missing.join(", ")));
        }

        let order: OrderRequest = serde_json::from_value(Value::Object(details))
            .map_err(|e| format!("invalid order: {e}"))?;
        if order.product.trim().is_empty() {
            return Err("product must not be empty".into());
        }
        if order.quantity == 0 {
            return Err("quantity must be at least 1".into());
        }
        Ok(Self(order))
    }
}

/// SHA-256 over the request id and the canonical JSON of the order.
///
/// Scoped to one pipeline request: a retry inside the request maps to the
/// same order, a later request placing the same order does not.
pub fn idempotency_key(order: &OrderRequest, request_id: Option<&str>) -> String {
    let canonical = serde_json::to_vec(order).unwrap_or_default();
    let mut hasher = Sha256::new();
    if let Some(request_id) = request_id {
        hasher.update(request_id.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(&canonical);
    format!("{:x}", hasher.finalize())
}

fn parse_args<T: DeserializeOwned>(arguments: &Map<String, Value>) -> Result<T, String> {
    serde_json::from_value(Value::Object(arguments.clone())).map_err(|e| e.to_string())
}

/// Runs tool calls against the store.
pub struct Dispatcher {
    store: Arc<dyn Store>,
    retry: RetryPolicy,
    event_bus: Option<Arc<EventBus>>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            event_bus: None,
        }
    }

    /// Publish a `ToolExecuted` event for every dispatch.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Dispatch one call outside of any session.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        self.dispatch_for(call, None, None).await
    }

    /// Dispatch one call. `session_id` fills an order's missing
    /// `customer_info.conversation_id`; `request_id` scopes order
    /// deduplication to a single pipeline request.
    pub async fn dispatch_for(
        &self,
        call: &ToolCall,
        session_id: Option<&str>,
        request_id: Option<&str>,
    ) -> ToolResult {
        let started = Instant::now();

        let (result, attempts) = match ToolKind::from_name(&call.name) {
            None => {
                let known: Vec<&str> = ToolKind::ALL.iter().map(|k| k.name()).collect();
                let detail = format!(
                    "unknown tool '{}', available tools: {}",
                    call.name,
                    known.join(", ")
                );
                (ToolResult::failure(call, DispatchErrorKind::UnknownTool, detail), 0)
            }
            Some(kind) => self.run(kind, call, session_id, request_id).await,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        if result.ok {
            info!(tool = %call.name, attempts, duration_ms, "Tool executed");
        } else {
            warn!(
                tool = %call.name,
                error = result.error.map(|k| k.as_str()).unwrap_or_default(),
                detail = result.detail.as_deref().unwrap_or_default(),
                attempts,
                "Tool dispatch failed"
            );
        }

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: call.name.clone(),
                success: result.ok,
                error: result.error.map(|k| k.to_string()),
                attempts,
                duration_ms,
                timestamp: Utc::now(),
            });
        }

        result
    }

    async fn run(
        &self,
        kind: ToolKind,
        call: &ToolCall,
        session_id: Option<&str>,
        request_id: Option<&str>,
    ) -> (ToolResult, u32) {
        let invalid = |detail: String| {
            (ToolResult::failure(call, DispatchErrorKind::InvalidArguments, detail), 0)
        };

        match kind {
            ToolKind::CheckInventoryDetail => {
                let args: InventoryLookupArgs = match parse_args(&call.arguments) {
                    Ok(args) => args,
                    Err(e) => return invalid(e),
                };
                if args.name.trim().is_empty() {
                    return invalid("name must not be empty".into());
                }
                let query = args.into_query();
                debug!(product = %query.name, storage = ?query.storage, color = ?query.color, "Inventory lookup");

                let store = &self.store;
                let query = &query;
                match self
                    .upstream("get_product", move || async move { store.get_product(query).await })
                    .await
                {
                    Ok((lookup, attempts)) => self.payload(call, &lookup, attempts),
                    Err(failure) => self.upstream_failure(call, "get_product", failure),
                }
            }

            ToolKind::CreateCustomerOrder => {
                let OrderArgs(mut order) = match OrderArgs::parse(&call.arguments) {
                    Ok(args) => args,
                    Err(e) => return invalid(e),
                };
                if order.customer_info.conversation_id.is_none() {
                    order.customer_info.conversation_id = session_id.map(str::to_string);
                }
                let key = idempotency_key(&order, request_id);

                let store = &self.store;
                let (order, key) = (&order, key.as_str());
                match self
                    .upstream("create_order", move || async move {
                        store.create_order(order, key).await
                    })
                    .await
                {
                    Ok((receipt, attempts)) => {
                        if receipt.duplicate {
                            info!(order_id = %receipt.order_id, "Order already exists for this request");
                        }
                        self.payload(call, &receipt, attempts)
                    }
                    Err(failure) => self.upstream_failure(call, "create_order", failure),
                }
            }

            ToolKind::GetOrder => {
                let args: GetOrderArgs = match parse_args(&call.arguments) {
                    Ok(args) => args,
                    Err(e) => return invalid(e),
                };
                let order_id = args.order_id.trim();
                if order_id.is_empty() {
                    return invalid("order_id must not be empty".into());
                }

                let store = &self.store;
                match self
                    .upstream("get_order", move || async move { store.get_order(order_id).await })
                    .await
                {
                    Ok((Some(order), attempts)) => {
                        (ToolResult::success(call, json!({ "found": true, "order": order })), attempts)
                    }
                    Ok((None, attempts)) => (
                        ToolResult::success(
                            call,
                            json!({
                                "found": false,
                                "order_id": order_id,
                                "message": format!("Order {order_id} not found"),
                            }),
                        ),
                        attempts,
                    ),
                    Err(failure) => self.upstream_failure(call, "get_order", failure),
                }
            }
        }
    }

    async fn upstream<T, F, Fut>(&self, label: &str, op: F) -> Result<(T, u32), RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.retry.run(label, op).await
    }

    fn payload<T: serde::Serialize>(&self, call: &ToolCall, value: &T, attempts: u32) -> (ToolResult, u32) {
        match serde_json::to_value(value) {
            Ok(payload) => (ToolResult::success(call, payload), attempts),
            Err(e) => (
                ToolResult::failure(
                    call,
                    DispatchErrorKind::UpstreamError,
                    format!("unserializable store response: {e}"),
                ),
                attempts,
            ),
        }
    }

    fn upstream_failure(&self, call: &ToolCall, label: &str, failure: RetryExhausted) -> (ToolResult, u32) {
        let detail = format!(
            "{label} failed after {} attempt(s): {}",
            failure.attempts, failure.last_error
        );
        (
            ToolResult::failure(call, DispatchErrorKind::UpstreamError, detail),
            failure.attempts,
        )
    }
}
