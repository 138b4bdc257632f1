//! The fixed sales pipeline: analysis → inventory → order → consultant.
//!
//! Stages run strictly in order, each prompt built from the outputs before
//! it. Inventory and order only run when the analysis asks for them.

use crate::context::RequestContext;
use crate::stage::{StageKind, StageSpec};
use crate::turn_loop::{StageOutcome, StageStatus, TurnLoop};
use salesdesk_config::AppConfig;
use salesdesk_core::event::EventBus;
use salesdesk_core::provider::{Provider, Usage};
use salesdesk_telemetry::{MetricsCollector, RequestTimer};
use salesdesk_tools::{Dispatcher, extract_json_object};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Customer reply when the consultant produced nothing usable.
pub const APOLOGY_REPLY: &str = "Xin lỗi, tôi không thể xử lý yêu cầu của bạn lúc này.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerIntent {
    CheckInventoryPrice,
    PlaceOrder,
    ProductInfo,
    GeneralQuery,
}

impl CustomerIntent {
    /// Lenient parse of a model-written intent. Unknown values are general
    /// queries.
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        match normalized.as_str() {
            "check_inventory_price" | "check_inventory" | "check_price" => {
                CustomerIntent::CheckInventoryPrice
            }
            "place_order" | "order" | "buy" => CustomerIntent::PlaceOrder,
            "product_info" => CustomerIntent::ProductInfo,
            _ => CustomerIntent::GeneralQuery,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerIntent::CheckInventoryPrice => "check_inventory_price",
            CustomerIntent::PlaceOrder => "place_order",
            CustomerIntent::ProductInfo => "product_info",
            CustomerIntent::GeneralQuery => "general_query",
        }
    }
}

/// The analysis stage's structured reading of the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Free-form: models send either a description or an object
    pub product_details: Value,
    pub customer_intent: CustomerIntent,
    pub original_query: String,
    pub requires_inventory_check: bool,
    pub requires_order_placement: bool,
}

impl AnalysisResult {
    /// No flags set: only the consultant runs.
    pub fn fallback(query: &str) -> Self {
        Self {
            product_details: Value::Null,
            customer_intent: CustomerIntent::GeneralQuery,
            original_query: query.to_string(),
            requires_inventory_check: false,
            requires_order_placement: false,
        }
    }

    /// Read the first JSON object in `output`.
    pub fn parse(output: &str, query: &str) -> Option<Self> {
        extract_json_object(output).map(|object| Self::from_object(&object, query))
    }

    pub fn from_object(object: &Map<String, Value>, query: &str) -> Self {
        let original_query = object
            .get("original_query")
            .and_then(Value::as_str)
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(query)
            .to_string();
        Self {
            product_details: object.get("product_details").cloned().unwrap_or(Value::Null),
            customer_intent: object
                .get("customer_intent")
                .and_then(Value::as_str)
                .map(CustomerIntent::parse)
                .unwrap_or(CustomerIntent::GeneralQuery),
            original_query,
            requires_inventory_check: flag(object.get("requires_inventory_check")),
            requires_order_placement: flag(object.get("requires_order_placement")),
        }
    }
}

fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

/// One customer request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub query: String,
    /// Extra customer context (name, phone, ...) passed to the order stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_context: Option<Value>,
    pub user_id: String,
    /// Generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl PipelineRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            initial_context: None,
            user_id: "anonymous".into(),
            session_id: None,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.initial_context = Some(context);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Success,
    Degraded,
    Cancelled,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Success => "success",
            PipelineStatus::Degraded => "degraded",
            PipelineStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResponse {
    /// Empty when the request was cancelled
    pub customer_response: String,
    /// One entry per executed stage, in order
    pub stage_outputs: Vec<StageOutcome>,
    pub session_id: String,
    pub status: PipelineStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<AnalysisResult>,
    pub token_usage: Usage,
}

impl PipelineResponse {
    pub fn stage(&self, kind: StageKind) -> Option<&StageOutcome> {
        self.stage_outputs.iter().find(|o| o.stage == kind)
    }
}

/// Runs customer requests through the four stages.
///
/// Holds only shared handles; every request gets its own
/// [`RequestContext`], so concurrent runs do not interact.
pub struct SalesPipeline {
    turn_loop: TurnLoop,
    reply_language: String,
    incorporate_results: bool,
    metrics: Option<Arc<MetricsCollector>>,
}

impl SalesPipeline {
    pub fn new(turn_loop: TurnLoop) -> Self {
        Self {
            turn_loop,
            reply_language: "Vietnamese".into(),
            incorporate_results: true,
            metrics: None,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        dispatcher: Arc<Dispatcher>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self::new(TurnLoop::from_config(config, provider, dispatcher, event_bus))
            .with_reply_language(config.pipeline.reply_language.clone())
            .with_incorporate_results(config.pipeline.incorporate_tool_results)
    }

    pub fn with_reply_language(mut self, language: impl Into<String>) -> Self {
        self.reply_language = language.into();
        self
    }

    pub fn with_incorporate_results(mut self, enabled: bool) -> Self {
        self.incorporate_results = enabled;
        self
    }

    /// Record one request per run.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Process one customer request. Never fails: stage problems surface as
    /// a degraded status and an apologetic reply.
    pub async fn run(&self, request: PipelineRequest, cancel: CancellationToken) -> PipelineResponse {
        let session_id = request
            .session_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let timer = RequestTimer::start(format!("pipeline {session_id}"));
        let mut ctx = RequestContext::new(session_id.clone(), request.user_id.clone(), cancel);
        let mut outputs: Vec<StageOutcome> = Vec::new();

        info!(
            session_id = %session_id,
            request_id = %ctx.request_id,
            user_id = %request.user_id,
            "Processing customer request"
        );

        // 1. Analysis
        let analysis = self
            .turn_loop
            .run_stage(&StageSpec::analysis(), analysis_input(&request), &mut ctx)
            .await;
        let analysis_status = analysis.status;
        let intent = match analysis_status {
            StageStatus::Cancelled => None,
            _ => Some(AnalysisResult::parse(&analysis.output, &request.query).unwrap_or_else(|| {
                warn!(session_id = %session_id, "Analysis output is not JSON, treating as a general query");
                AnalysisResult::fallback(&request.query)
            })),
        };
        outputs.push(analysis);

        if let Some(intent) = &intent {
            let stages = [
                (intent.requires_inventory_check, StageKind::Inventory),
                (intent.requires_order_placement, StageKind::Order),
                (true, StageKind::Consultant),
            ];
            for (wanted, kind) in stages {
                if !wanted {
                    continue;
                }
                let (spec, input) = match kind {
                    StageKind::Inventory => (
                        StageSpec::inventory(self.incorporate_results),
                        inventory_input(&request, intent),
                    ),
                    StageKind::Order => (
                        StageSpec::order(self.incorporate_results),
                        order_input(&request, intent, &outputs, &session_id),
                    ),
                    _ => (
                        StageSpec::consultant(&self.reply_language),
                        consultant_input(&request, intent, &outputs),
                    ),
                };
                let outcome = self.turn_loop.run_stage(&spec, input, &mut ctx).await;
                let cancelled = outcome.status == StageStatus::Cancelled;
                outputs.push(outcome);
                if cancelled {
                    break;
                }
            }
        }

        let status = if outputs.iter().any(|o| o.status == StageStatus::Cancelled) {
            PipelineStatus::Cancelled
        } else if outputs.iter().any(|o| o.status == StageStatus::Degraded) {
            PipelineStatus::Degraded
        } else {
            PipelineStatus::Success
        };

        let customer_response = match (status, outputs.last()) {
            (PipelineStatus::Cancelled, _) => String::new(),
            (_, Some(last))
                if last.stage == StageKind::Consultant
                    && last.status == StageStatus::Completed
                    && !last.output.trim().is_empty() =>
            {
                last.output.trim().to_string()
            }
            _ => APOLOGY_REPLY.to_string(),
        };

        let elapsed = timer.finish(status == PipelineStatus::Success);
        if let Some(metrics) = &self.metrics {
            let error_type = match status {
                PipelineStatus::Success => None,
                PipelineStatus::Degraded => Some("degraded_stage"),
                PipelineStatus::Cancelled => Some("cancelled"),
            };
            metrics.record_request(
                status == PipelineStatus::Success,
                elapsed,
                intent.as_ref().map(|i| i.customer_intent.as_str()),
                Some(u64::from(ctx.token_usage.total_tokens)),
                error_type,
            );
        }

        info!(
            session_id = %session_id,
            status = status.as_str(),
            stages = outputs.len(),
            tokens = ctx.token_usage.total_tokens,
            elapsed_ms = elapsed.as_millis() as u64,
            "Customer request finished"
        );

        PipelineResponse {
            customer_response,
            stage_outputs: outputs,
            session_id,
            status,
            intent,
            token_usage: ctx.token_usage,
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".into())
}

fn stage_output(outputs: &[StageOutcome], kind: StageKind) -> Option<&str> {
    outputs
        .iter()
        .find(|o| o.stage == kind)
        .map(|o| o.output.as_str())
}

fn analysis_input(request: &PipelineRequest) -> String {
    match &request.initial_context {
        Some(context) => format!(
            "Customer query: {}\nCustomer context: {}",
            request.query,
            to_json(context)
        ),
        None => format!("Customer query: {}", request.query),
    }
}

fn inventory_input(request: &PipelineRequest, intent: &AnalysisResult) -> String {
    format!(
        "Customer query: {}\nProduct details: {}\nCheck the stock of this product.",
        request.query,
        to_json(&intent.product_details)
    )
}

fn order_input(
    request: &PipelineRequest,
    intent: &AnalysisResult,
    outputs: &[StageOutcome],
    session_id: &str,
) -> String {
    let context = request
        .initial_context
        .as_ref()
        .map(to_json)
        .unwrap_or_else(|| "{}".into());
    format!(
        "Customer query: {}\nAnalysis: {}\nInventory result: {}\nCustomer context: {}\n\
         Session id (use as customer_info.conversation_id): {}\n\
         Create the order only if the product is in stock.",
        request.query,
        to_json(intent),
        stage_output(outputs, StageKind::Inventory).unwrap_or("not checked"),
        context,
        session_id
    )
}

fn consultant_input(
    request: &PipelineRequest,
    intent: &AnalysisResult,
    outputs: &[StageOutcome],
) -> String {
    format!(
        "Customer query: {}\nAnalysis: {}\nInventory: {}\nOrder: {}",
        request.query,
        to_json(intent),
        stage_output(outputs, StageKind::Inventory).unwrap_or("not checked"),
        stage_output(outputs, StageKind::Order).unwrap_or("no order placed"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{SequentialMockProvider, make_text_response};
    use salesdesk_core::error::ProviderError;
    use salesdesk_core::message::Role;
    use salesdesk_core::store::Store;
    use salesdesk_store::{InMemoryStore, seed_catalog};
    use salesdesk_tools::RetryPolicy;

    const GENERAL: &str = r#"{"product_details": "", "customer_intent": "general_query", "original_query": "hello", "requires_inventory_check": false, "requires_order_placement": false}"#;
    const PRICE_CHECK: &str = r#"{"product_details": {"name": "iPhone 15 Pro Max", "storage": "256GB"}, "customer_intent": "check_inventory_price", "original_query": "q", "requires_inventory_check": true, "requires_order_placement": false}"#;
    const BUY: &str = r#"{"product_details": {"name": "iPhone 15 Pro Max", "storage": "256GB"}, "customer_intent": "place_order", "original_query": "q", "requires_inventory_check": true, "requires_order_placement": true}"#;
    const INVENTORY_CALL: &str = "TOOL_CALL: check_inventory_detail\n\
        ARGS: {\"product\": \"iPhone 15 Pro Max\", \"storage\": \"256GB\"}";
    const ORDER_CALL: &str = "TOOL_CALL: create_customer_order\n\
        ARGS: {\"order_details\": {\"product\": \"iPhone 15 Pro Max\", \"storage\": \"256GB\", \"quantity\": 1, \"total_price\": 27990000, \"customer_info\": {\"customer_name\": \"Lan\"}}}";

    fn pipeline(provider: Arc<SequentialMockProvider>) -> (SalesPipeline, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::with_products(seed_catalog()));
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), RetryPolicy::default()));
        let turn_loop = TurnLoop::new(provider, "mock-model", dispatcher, Arc::new(EventBus::default()))
            .with_backoff_base(std::time::Duration::from_millis(1));
        (SalesPipeline::new(turn_loop), store)
    }

    fn kinds(response: &PipelineResponse) -> Vec<StageKind> {
        response.stage_outputs.iter().map(|o| o.stage).collect()
    }

    #[tokio::test]
    async fn general_query_skips_tool_stages() {
        let provider = Arc::new(SequentialMockProvider::texts(&[GENERAL, "Xin chào! Tôi có thể giúp gì?"]));
        let (pipeline, _) = pipeline(provider.clone());

        let response = pipeline
            .run(PipelineRequest::new("hello"), CancellationToken::new())
            .await;

        assert_eq!(response.status, PipelineStatus::Success);
        assert_eq!(kinds(&response), vec![StageKind::Analysis, StageKind::Consultant]);
        assert_eq!(response.customer_response, "Xin chào! Tôi có thể giúp gì?");
        assert_eq!(response.intent.unwrap().customer_intent, CustomerIntent::GeneralQuery);
        assert_eq!(provider.call_count(), 2);
        assert_eq!(response.token_usage.total_tokens, 30);
    }

    #[tokio::test]
    async fn price_check_runs_inventory() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            PRICE_CHECK,
            INVENTORY_CALL,
            r#"{"product_name": "iPhone 15 Pro Max", "stock_status": "in_stock", "price": 27990000, "quantity": 3}"#,
            "Dạ, iPhone 15 Pro Max còn 3 chiếc, giá 27.990.000 VNĐ.",
        ]));
        let (pipeline, store) = pipeline(provider.clone());

        let response = pipeline
            .run(PipelineRequest::new("iPhone 15 Pro Max giá bao nhiêu?"), CancellationToken::new())
            .await;

        assert_eq!(response.status, PipelineStatus::Success);
        assert_eq!(
            kinds(&response),
            vec![StageKind::Analysis, StageKind::Inventory, StageKind::Consultant]
        );
        assert!(response.stage(StageKind::Inventory).unwrap().tool_result.as_ref().unwrap().ok);
        assert_eq!(store.order_count().await, 0);

        // The consultant saw the inventory stage's answer.
        let consultant_request = provider.request(3).unwrap();
        let prompt = &consultant_request.messages.last().unwrap().content;
        assert!(prompt.contains("in_stock"));
        assert!(prompt.contains("no order placed"));
    }

    #[tokio::test]
    async fn purchase_runs_all_four_stages() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            BUY,
            INVENTORY_CALL,
            r#"{"stock_status": "in_stock", "price": 27990000}"#,
            ORDER_CALL,
            r#"{"order_created": true}"#,
            "Cảm ơn anh/chị! Đơn hàng đã được đặt thành công.",
        ]));
        let (pipeline, store) = pipeline(provider.clone());

        let request = PipelineRequest::new("Tôi muốn mua iPhone 15 Pro Max 256GB")
            .with_user("lan")
            .with_session("sess-42")
            .with_context(serde_json::json!({"customer_name": "Lan"}));
        let response = pipeline.run(request, CancellationToken::new()).await;

        assert_eq!(response.status, PipelineStatus::Success);
        assert_eq!(response.session_id, "sess-42");
        assert_eq!(
            kinds(&response),
            vec![
                StageKind::Analysis,
                StageKind::Inventory,
                StageKind::Order,
                StageKind::Consultant
            ]
        );
        assert_eq!(provider.call_count(), 6);

        // Order prompt carried the session and customer context.
        let order_request = provider.request(3).unwrap();
        let prompt = &order_request
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .unwrap()
            .content;
        assert!(prompt.contains("sess-42"));
        assert!(prompt.contains("Lan"));

        // The order landed in the store, tagged with the session.
        assert_eq!(store.order_count().await, 1);
        let receipt = response.stage(StageKind::Order).unwrap().tool_result.clone().unwrap();
        let order_id = receipt.payload.unwrap()["order_id"].as_str().unwrap().to_string();
        let order = store.get_order(&order_id).await.unwrap().unwrap();
        assert_eq!(order.order_details.customer_info.conversation_id.as_deref(), Some("sess-42"));
    }

    #[tokio::test]
    async fn repeat_purchase_in_one_session_places_a_new_order() {
        let purchase = [
            BUY,
            INVENTORY_CALL,
            r#"{"stock_status": "in_stock", "price": 27990000}"#,
            ORDER_CALL,
            r#"{"order_created": true}"#,
            "Đơn hàng đã được đặt.",
        ];
        let script: Vec<&str> = purchase.iter().chain(purchase.iter()).copied().collect();
        let provider = Arc::new(SequentialMockProvider::texts(&script));
        let (pipeline, store) = pipeline(provider);

        let mut receipts = Vec::new();
        for _ in 0..2 {
            let request = PipelineRequest::new("Cho tôi thêm một chiếc iPhone 15 Pro Max")
                .with_session("chat-1");
            let response = pipeline.run(request, CancellationToken::new()).await;
            assert_eq!(response.status, PipelineStatus::Success);
            let result = response.stage(StageKind::Order).unwrap().tool_result.clone().unwrap();
            receipts.push(result.payload.unwrap());
        }

        assert_eq!(store.order_count().await, 2);
        assert_eq!(receipts[0]["duplicate"], false);
        assert_eq!(receipts[1]["duplicate"], false);
        assert_ne!(receipts[0]["order_id"], receipts[1]["order_id"]);
    }

    #[tokio::test]
    async fn unparseable_analysis_is_a_general_query() {
        let provider = Arc::new(SequentialMockProvider::texts(&["I think they want a phone", "Chào bạn!"]));
        let (pipeline, _) = pipeline(provider);

        let response = pipeline
            .run(PipelineRequest::new("phone?"), CancellationToken::new())
            .await;

        assert_eq!(kinds(&response), vec![StageKind::Analysis, StageKind::Consultant]);
        let intent = response.intent.unwrap();
        assert!(!intent.requires_inventory_check);
        assert_eq!(intent.original_query, "phone?");
    }

    #[tokio::test]
    async fn empty_consultant_reply_becomes_apology() {
        let provider = Arc::new(SequentialMockProvider::texts(&[GENERAL, "<think>hmm</think>"]));
        let (pipeline, _) = pipeline(provider);

        let response = pipeline
            .run(PipelineRequest::new("hello"), CancellationToken::new())
            .await;

        assert_eq!(response.customer_response, APOLOGY_REPLY);
    }

    #[tokio::test]
    async fn provider_outage_degrades_without_failing() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Err(ProviderError::Network("down".into())),
            Err(ProviderError::Network("down".into())),
        ]));
        let store = Arc::new(InMemoryStore::new());
        let dispatcher = Arc::new(Dispatcher::new(store, RetryPolicy::default()));
        let turn_loop = TurnLoop::new(provider.clone(), "m", dispatcher, Arc::new(EventBus::default()))
            .with_max_attempts(1);
        let metrics = Arc::new(MetricsCollector::new());
        let pipeline = SalesPipeline::new(turn_loop).with_metrics(metrics.clone());

        let response = pipeline
            .run(PipelineRequest::new("hello"), CancellationToken::new())
            .await;

        assert_eq!(response.status, PipelineStatus::Degraded);
        assert_eq!(response.customer_response, APOLOGY_REPLY);
        assert_eq!(kinds(&response), vec![StageKind::Analysis, StageKind::Consultant]);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.errors_by_type["degraded_stage"], 1);
    }

    #[tokio::test]
    async fn cancelled_request_stops_early() {
        let provider = Arc::new(SequentialMockProvider::texts(&[GENERAL, "unused"]));
        let (pipeline, _) = pipeline(provider.clone());
        let token = CancellationToken::new();
        token.cancel();

        let response = pipeline.run(PipelineRequest::new("hello"), token).await;

        assert_eq!(response.status, PipelineStatus::Cancelled);
        assert!(response.customer_response.is_empty());
        assert!(response.intent.is_none());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn sessions_are_generated_when_missing() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Ok(make_text_response(GENERAL)),
            Ok(make_text_response("hi")),
            Ok(make_text_response(GENERAL)),
            Ok(make_text_response("hi")),
        ]));
        let (pipeline, _) = pipeline(provider);

        let a = pipeline.run(PipelineRequest::new("hello"), CancellationToken::new()).await;
        let b = pipeline.run(PipelineRequest::new("hello"), CancellationToken::new()).await;

        assert_ne!(a.session_id, b.session_id);
        assert!(Uuid::parse_str(&a.session_id).is_ok());
    }

    #[tokio::test]
    async fn successful_runs_are_recorded_with_intent() {
        let provider = Arc::new(SequentialMockProvider::texts(&[GENERAL, "hi"]));
        let (pipeline, _) = pipeline(provider);
        let metrics = Arc::new(MetricsCollector::new());
        let pipeline = pipeline.with_metrics(metrics.clone());

        pipeline.run(PipelineRequest::new("hello"), CancellationToken::new()).await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.successful_requests, 1);
        assert_eq!(snapshot.requests_by_intent["general_query"], 1);
        assert_eq!(snapshot.total_tokens_used, 30);
    }

    #[test]
    fn analysis_parsing_is_lenient() {
        let output = "```json\n{'customer_intent': 'Place Order', 'requires_inventory_check': 'true', \
                      'requires_order_placement': True,}\n```";
        let parsed = AnalysisResult::parse(output, "mua iPhone").unwrap();
        assert_eq!(parsed.customer_intent, CustomerIntent::PlaceOrder);
        assert!(parsed.requires_inventory_check);
        assert!(parsed.requires_order_placement);
        assert_eq!(parsed.original_query, "mua iPhone");
        assert_eq!(parsed.product_details, Value::Null);
    }

    #[test]
    fn unknown_intent_is_general() {
        assert_eq!(CustomerIntent::parse("haggle"), CustomerIntent::GeneralQuery);
        assert_eq!(CustomerIntent::parse("check-inventory-price"), CustomerIntent::CheckInventoryPrice);
    }
}
