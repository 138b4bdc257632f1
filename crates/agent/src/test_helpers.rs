//! Shared test helpers for turn-loop and pipeline tests.

use salesdesk_core::error::ProviderError;
use salesdesk_core::message::{Message, MessageToolCall};
use salesdesk_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use salesdesk_store::{InMemoryStore, seed_catalog};
use salesdesk_tools::{Dispatcher, RetryPolicy};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A mock provider that returns a sequence of scripted results.
///
/// Each call to `complete` returns the next entry and records the request.
/// Panics if more calls are made than entries provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Plain text replies, in order.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(make_text_response(t))).collect())
    }

    /// Sleep this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The `n`th request received (0-based).
    pub fn request(&self, n: usize) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().get(n).cloned()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let responses = self.responses.lock().unwrap();
        match responses.get(n) {
            Some(result) => result.clone(),
            None => panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                n,
                responses.len()
            ),
        }
    }
}

pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::agent(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    let mut response = make_text_response("");
    response.message.tool_calls = tool_calls;
    response
}

pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}

/// A dispatcher over the in-memory demo catalog with fast retries.
pub fn dispatcher_with_catalog() -> Arc<Dispatcher> {
    let store = Arc::new(InMemoryStore::with_products(seed_catalog()));
    let retry = RetryPolicy {
        backoff_base: Duration::from_millis(10),
        ..RetryPolicy::default()
    };
    Arc::new(Dispatcher::new(store, retry))
}
