//! End-to-end integration tests for the salesdesk pipeline.
//!
//! These tests wire config → store → dispatcher → pipeline the way the CLI
//! does, with a scripted provider standing in for the LLM server.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use salesdesk_agent::{
    CancellationToken, PipelineRequest, PipelineStatus, SalesPipeline, StageKind, StageStatus,
};
use salesdesk_config::{AppConfig, StoreBackend};
use salesdesk_core::error::{ProviderError, StoreError};
use salesdesk_core::event::EventBus;
use salesdesk_core::message::{Message, Role};
use salesdesk_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use salesdesk_core::store::{
    OrderReceipt, OrderRecord, OrderRequest, ProductLookup, ProductQuery, ProductRecord, Store,
};
use salesdesk_core::tool::DispatchErrorKind;
use salesdesk_store::{InMemoryStore, seed_catalog};
use salesdesk_telemetry::MetricsCollector;
use salesdesk_tools::{Dispatcher, Extraction, RetryPolicy, extract};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted replies in sequence.
struct ScriptedProvider {
    replies: std::sync::Mutex<Vec<String>>,
    call_count: std::sync::Mutex<usize>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: std::sync::Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            call_count: std::sync::Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut count = self.call_count.lock().unwrap();
        let replies = self.replies.lock().unwrap();
        if *count >= replies.len() {
            panic!("ScriptedProvider exhausted: call #{}, have {}", *count, replies.len());
        }
        let reply = replies[*count].clone();
        *count += 1;
        Ok(text_response(&reply))
    }
}

/// Answers from the request itself, so concurrent runs stay deterministic:
/// analysis gets a general-query JSON, the consultant echoes the query.
struct EchoProvider;

#[async_trait::async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let system = &request.messages[0].content;
        let user = request
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let reply = if system.starts_with("You analyse") {
            GENERAL.to_string()
        } else {
            let query = user
                .lines()
                .next()
                .unwrap_or_default()
                .trim_start_matches("Customer query: ");
            format!("echo: {query}")
        };
        Ok(text_response(&reply))
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::agent(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock".into(),
    }
}

const GENERAL: &str = r#"{"product_details": "", "customer_intent": "general_query", "requires_inventory_check": false, "requires_order_placement": false}"#;
const BUY: &str = r#"Here is my analysis:
```json
{"product_details": {"name": "iPhone 15 Pro Max", "storage": "256GB"}, "customer_intent": "place_order", "original_query": "Tôi muốn mua iPhone 15 Pro Max 256GB", "requires_inventory_check": true, "requires_order_placement": true}
```"#;
const INVENTORY_CALL: &str = "TOOL_CALL: check_inventory_detail\n\
    ARGS: {\"product\": \"iPhone 15 Pro Max\", \"storage\": \"256GB\"}";
const ORDER_CALL: &str = "TOOL_CALL: create_customer_order\n\
    ARGS: {\"order_details\": {\"product\": \"iPhone 15 Pro Max\", \"storage\": \"256GB\", \"quantity\": 1, \"total_price\": 27990000, \"customer_info\": {\"customer_name\": \"Lan\"}}}";

fn write_config(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

fn runtime(
    config: &AppConfig,
    store: Arc<dyn Store>,
    provider: Arc<dyn Provider>,
) -> (SalesPipeline, Arc<MetricsCollector>, Arc<EventBus>) {
    let event_bus = Arc::new(EventBus::default());
    let metrics = Arc::new(MetricsCollector::new());
    metrics.spawn_listener(&event_bus);
    let retry = RetryPolicy {
        max_attempts: config.pipeline.max_attempts,
        timeout: config.pipeline.tool_timeout(),
        backoff_base: config.pipeline.backoff_base(),
    };
    let dispatcher = Arc::new(Dispatcher::new(store, retry).with_event_bus(event_bus.clone()));
    let pipeline = SalesPipeline::from_config(config, provider, dispatcher, event_bus.clone())
        .with_metrics(metrics.clone());
    (pipeline, metrics, event_bus)
}

// ── E2E: Purchase against SQLite ─────────────────────────────────────────

#[tokio::test]
async fn e2e_purchase_is_persisted_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("salesdesk.db");
    let path = write_config(
        dir.path(),
        &format!(
            r#"
[llm]
api_url = "http://127.0.0.1:9/v1"
model = "mock-model"
timeout_secs = 5

[store]
backend = "sqlite"
path = "sqlite://{}"

[pipeline]
max_attempts = 2
backoff_base_ms = 10
reply_language = "English"
"#,
            db.display()
        ),
    );
    let config = AppConfig::load_with_env(&path, |_| None).unwrap();
    assert_eq!(config.store.backend, StoreBackend::Sqlite);

    let store = salesdesk_store::open_from_config(&config.store).await.unwrap();
    assert_eq!(store.name(), "sqlite");

    let provider = Arc::new(ScriptedProvider::new(&[
        BUY,
        INVENTORY_CALL,
        r#"{"product_name": "iPhone 15 Pro Max", "stock_status": "in_stock", "price": 27990000, "quantity": 3}"#,
        ORDER_CALL,
        r#"{"order_created": true, "message": "Order created"}"#,
        "Thank you! Your iPhone 15 Pro Max order is confirmed.",
    ]));
    let (pipeline, metrics, _bus) = runtime(&config, store.clone(), provider.clone());

    let request = PipelineRequest::new("Tôi muốn mua iPhone 15 Pro Max 256GB")
        .with_user("lan")
        .with_context(serde_json::json!({"customer_name": "Lan"}));
    let response = pipeline.run(request, CancellationToken::new()).await;

    assert_eq!(response.status, PipelineStatus::Success);
    assert_eq!(response.customer_response, "Thank you! Your iPhone 15 Pro Max order is confirmed.");
    assert_eq!(response.stage_outputs.len(), 4);
    assert_eq!(provider.calls(), 6);
    assert_eq!(response.token_usage.total_tokens, 90);

    let order = response.stage(StageKind::Order).unwrap();
    let payload = order.tool_result.as_ref().unwrap().payload.clone().unwrap();
    let order_id = payload["order_id"].as_str().unwrap();
    assert!(order_id.starts_with("order_"));

    let stored = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(stored.order_details.product, "iPhone 15 Pro Max");
    assert_eq!(stored.order_details.customer_info.customer_name, "Lan");
    assert_eq!(
        stored.order_details.customer_info.conversation_id.as_deref(),
        Some(response.session_id.as_str())
    );

    // Give the metrics listener a moment to drain the bus.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.successful_requests, 1);
    assert_eq!(snapshot.requests_by_intent["place_order"], 1);
    assert_eq!(snapshot.tool_calls, 2);
    assert_eq!(snapshot.tool_failures, 0);
}

// ── E2E: Extractor + Dispatcher ──────────────────────────────────────────

#[tokio::test]
async fn e2e_function_style_call_is_extracted_and_dispatched() {
    let text = r#"Here is the call: check_inventory_detail({"name": "iPhone 15 Pro Max", "storage": "256GB", "color": "Titan"})"#;
    let call = match extract(text) {
        Extraction::Found(call) => call,
        other => panic!("expected a call, got {other:?}"),
    };
    assert_eq!(call.name, "check_inventory_detail");
    assert_eq!(
        serde_json::Value::Object(call.arguments.clone()),
        serde_json::json!({"name": "iPhone 15 Pro Max", "storage": "256GB", "color": "Titan"})
    );

    // The catalog's color is "Titan tự nhiên", so an exact color filter misses.
    let store = Arc::new(InMemoryStore::with_products(seed_catalog()));
    let dispatcher = Dispatcher::new(store, RetryPolicy::default());
    let result = dispatcher.dispatch(&call).await;
    assert!(result.ok);
    assert_eq!(result.payload.unwrap()["found"], false);
}

#[tokio::test]
async fn e2e_order_is_deduplicated_per_request() {
    let store = Arc::new(InMemoryStore::with_products(seed_catalog()));
    let dispatcher = Dispatcher::new(store.clone(), RetryPolicy::default());
    let call = match extract(ORDER_CALL) {
        Extraction::Found(call) => call,
        other => panic!("expected a call, got {other:?}"),
    };

    // A retry inside one request maps onto the order already placed.
    let first = dispatcher.dispatch_for(&call, Some("sess-1"), Some("req-1")).await;
    let retried = dispatcher.dispatch_for(&call, Some("sess-1"), Some("req-1")).await;

    let first = first.payload.unwrap();
    let retried = retried.payload.unwrap();
    assert_eq!(first["order_id"], retried["order_id"]);
    assert_eq!(retried["duplicate"], true);
    assert_eq!(store.order_count().await, 1);

    // The same order in a later request of the same session is a new order.
    let again = dispatcher.dispatch_for(&call, Some("sess-1"), Some("req-2")).await;
    let again = again.payload.unwrap();
    assert_eq!(again["duplicate"], false);
    assert_ne!(again["order_id"], first["order_id"]);
    assert_eq!(store.order_count().await, 2);
}

// ── E2E: Upstream timeouts ───────────────────────────────────────────────

/// Wraps the memory store; the first `hangs` lookups never answer.
struct HangingStore {
    inner: InMemoryStore,
    hangs: u32,
    calls: AtomicU32,
}

#[async_trait::async_trait]
impl Store for HangingStore {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn get_product(&self, query: &ProductQuery) -> Result<ProductLookup, StoreError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.hangs {
            std::future::pending::<()>().await;
        }
        self.inner.get_product(query).await
    }

    async fn create_order(&self, request: &OrderRequest, key: &str) -> Result<OrderReceipt, StoreError> {
        self.inner.create_order(request, key).await
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        self.inner.get_order(order_id).await
    }

    async fn upsert_products(&self, products: &[ProductRecord]) -> Result<usize, StoreError> {
        self.inner.upsert_products(products).await
    }
}

const PRICE_CHECK: &str = r#"{"product_details": {"name": "iPhone 15 Pro Max"}, "customer_intent": "check_inventory_price", "requires_inventory_check": true, "requires_order_placement": false}"#;

#[tokio::test(start_paused = true)]
async fn e2e_store_recovers_on_third_attempt() {
    let config = AppConfig::default();
    let store = Arc::new(HangingStore {
        inner: InMemoryStore::with_products(seed_catalog()),
        hangs: 2,
        calls: AtomicU32::new(0),
    });
    let provider = Arc::new(ScriptedProvider::new(&[
        PRICE_CHECK,
        INVENTORY_CALL,
        r#"{"stock_status": "in_stock", "price": 27990000, "quantity": 3}"#,
        "Còn 3 chiếc, giá 27.990.000 VNĐ.",
    ]));
    let (pipeline, _, _) = runtime(&config, store.clone(), provider);

    let response = pipeline
        .run(PipelineRequest::new("iPhone 15 Pro Max còn không?"), CancellationToken::new())
        .await;

    assert_eq!(response.status, PipelineStatus::Success);
    assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    let inventory = response.stage(StageKind::Inventory).unwrap();
    assert!(inventory.tool_result.as_ref().unwrap().ok);
}

#[tokio::test(start_paused = true)]
async fn e2e_store_outage_degrades_the_request() {
    let mut config = AppConfig::default();
    config.pipeline.max_attempts = 2;
    let store = Arc::new(HangingStore {
        inner: InMemoryStore::with_products(seed_catalog()),
        hangs: u32::MAX,
        calls: AtomicU32::new(0),
    });
    let provider = Arc::new(ScriptedProvider::new(&[
        PRICE_CHECK,
        INVENTORY_CALL,
        INVENTORY_CALL,
        "Xin lỗi, hệ thống kho đang bận.",
    ]));
    let (pipeline, _, _) = runtime(&config, store, provider);

    let response = pipeline
        .run(PipelineRequest::new("iPhone 15 Pro Max còn không?"), CancellationToken::new())
        .await;

    assert_eq!(response.status, PipelineStatus::Degraded);
    let inventory = response.stage(StageKind::Inventory).unwrap();
    assert_eq!(inventory.status, StageStatus::Degraded);
    assert_eq!(
        inventory.tool_result.as_ref().unwrap().error,
        Some(DispatchErrorKind::UpstreamError)
    );
    // The consultant still answered.
    assert_eq!(response.customer_response, "Xin lỗi, hệ thống kho đang bận.");
}

// ── E2E: Concurrency and cancellation ────────────────────────────────────

#[tokio::test]
async fn e2e_concurrent_requests_are_independent() {
    let config = AppConfig::default();
    let store = Arc::new(InMemoryStore::with_products(seed_catalog()));
    let (pipeline, metrics, _) = runtime(&config, store, Arc::new(EchoProvider));
    let pipeline = Arc::new(pipeline);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                let request = PipelineRequest::new(format!("question {i}")).with_session(format!("s{i}"));
                pipeline.run(request, CancellationToken::new()).await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let response = handle.await.unwrap();
        assert_eq!(response.session_id, format!("s{i}"));
        assert_eq!(response.customer_response, format!("echo: question {i}"));
        assert_eq!(response.token_usage.total_tokens, 30);
    }
    assert_eq!(metrics.snapshot().total_requests, 4);
}

#[tokio::test]
async fn e2e_cancelled_request_returns_promptly() {
    let config = AppConfig::default();
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(ScriptedProvider::new(&[]));
    let (pipeline, metrics, _) = runtime(&config, store, provider.clone());

    let token = CancellationToken::new();
    token.cancel();
    let response = pipeline.run(PipelineRequest::new("hello"), token).await;

    assert_eq!(response.status, PipelineStatus::Cancelled);
    assert_eq!(provider.calls(), 0);
    assert_eq!(metrics.snapshot().errors_by_type["cancelled"], 1);
}
