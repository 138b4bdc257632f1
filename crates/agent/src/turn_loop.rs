//! The per-stage turn loop.
//!
//! Each stage walks `AWAIT_MODEL → HAVE_CALL → HAVE_RESULT → DONE`:
//!
//! 1. **Send** the stage conversation to the provider (bounded by the LLM
//!    timeout, raced against the request's cancellation token)
//! 2. **Extract** a call: native `tool_calls` first, then the text markers
//! 3. **Dispatch** it and append the observation as a `tool` turn
//! 4. **Loop back** so the model can phrase the result, or stop
//!
//! Provider errors and failed dispatches share one failure budget. Running
//! out of it ends the stage with a degraded reply; nothing here returns an
//! error to the caller.

use crate::context::RequestContext;
use crate::stage::{StageKind, StageSpec};
use chrono::Utc;
use salesdesk_config::AppConfig;
use salesdesk_core::error::ProviderError;
use salesdesk_core::event::{DomainEvent, EventBus};
use salesdesk_core::message::{Conversation, ConversationId, Message};
use salesdesk_core::provider::{Provider, ProviderRequest, ProviderResponse};
use salesdesk_core::tool::{DispatchErrorKind, ToolCall, ToolKind, ToolResult};
use salesdesk_tools::{Dispatcher, Extraction, MalformedCall, extract, repair, strip_reasoning};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Stage output when the failure budget runs out before any usable result.
pub const DEGRADED_REPLY: &str =
    "Sorry, this step could not be completed right now. Please try again in a moment.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Completed,
    Degraded,
    Cancelled,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Completed => "completed",
            StageStatus::Degraded => "degraded",
            StageStatus::Cancelled => "cancelled",
        }
    }
}

/// What a stage produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: StageKind,
    pub output: String,
    pub status: StageStatus,
    /// Latest dispatch result, successful or not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
    pub model_calls: u32,
    pub tool_calls: u32,
}

/// Counters for one stage run.
struct StageRun {
    stage: StageKind,
    failures: u32,
    model_calls: u32,
    tool_calls: u32,
    dispatched: u32,
    tool_result: Option<ToolResult>,
}

impl StageRun {
    fn new(stage: StageKind) -> Self {
        Self {
            stage,
            failures: 0,
            model_calls: 0,
            tool_calls: 0,
            dispatched: 0,
            tool_result: None,
        }
    }

    /// Observation of the last successful dispatch.
    fn successful_observation(&self) -> Option<String> {
        self.tool_result
            .as_ref()
            .filter(|r| r.ok)
            .map(ToolResult::to_observation)
    }

    fn outcome(self, status: StageStatus, output: String) -> StageOutcome {
        StageOutcome {
            stage: self.stage,
            output,
            status,
            tool_result: self.tool_result,
            model_calls: self.model_calls,
            tool_calls: self.tool_calls,
        }
    }

    fn completed(self, text: String) -> StageOutcome {
        let output = if text.is_empty() {
            self.successful_observation().unwrap_or_default()
        } else {
            text
        };
        self.outcome(StageStatus::Completed, output)
    }

    fn degraded(self) -> StageOutcome {
        let output = self
            .successful_observation()
            .unwrap_or_else(|| DEGRADED_REPLY.to_string());
        self.outcome(StageStatus::Degraded, output)
    }

    fn cancelled(self) -> StageOutcome {
        self.outcome(StageStatus::Cancelled, String::new())
    }
}

/// Drives one stage at a time against a provider and a dispatcher.
pub struct TurnLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// Tool dispatcher shared by every request
    dispatcher: Arc<Dispatcher>,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,

    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    top_p: Option<f32>,
    seed: Option<u64>,

    /// Bound on a single provider call
    llm_timeout: Duration,

    /// Failure budget per stage
    max_attempts: u32,

    /// Delay before provider retry `n` is `backoff_base * 2^n`
    backoff_base: Duration,

    /// Attach tool schemas to requests for stages that have tools
    native_tools: bool,
}

impl TurnLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        dispatcher: Arc<Dispatcher>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            event_bus,
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
            top_p: None,
            seed: None,
            llm_timeout: Duration::from_secs(60),
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            native_tools: false,
        }
    }

    /// Build a loop with the sampling, timeout and retry settings of `config`.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        dispatcher: Arc<Dispatcher>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let llm = &config.llm;
        Self::new(provider, llm.model.clone(), dispatcher, event_bus)
            .with_sampling(llm.temperature, llm.top_p, llm.seed)
            .with_max_tokens(llm.max_tokens)
            .with_llm_timeout(llm.timeout())
            .with_max_attempts(config.pipeline.max_attempts)
            .with_backoff_base(config.pipeline.backoff_base())
            .with_native_tools(llm.native_tools)
    }

    pub fn with_sampling(mut self, temperature: f32, top_p: f32, seed: u64) -> Self {
        self.temperature = temperature;
        self.top_p = Some(top_p);
        self.seed = Some(seed);
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_native_tools(mut self, enabled: bool) -> Self {
        self.native_tools = enabled;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, spec: &StageSpec, conversation: &Conversation) -> ProviderRequest {
        let mut request = ProviderRequest::new(&self.model, conversation.messages.clone());
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        request.top_p = self.top_p;
        request.seed = self.seed;
        if self.native_tools {
            request.tools = spec.tools.iter().map(ToolKind::to_definition).collect();
        }
        request
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match tokio::time::timeout(self.llm_timeout, self.provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!(
                "no completion within {}s",
                self.llm_timeout.as_secs()
            ))),
        }
    }

    fn backoff(&self, retry: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(retry))
    }

    /// Run one stage to `DONE`.
    pub async fn run_stage(
        &self,
        spec: &StageSpec,
        input: impl Into<String>,
        ctx: &mut RequestContext,
    ) -> StageOutcome {
        let mut conversation =
            Conversation::with_id(ConversationId(format!("{}:{}", ctx.session_id, spec.kind)));
        conversation.push(Message::system(spec.system_prompt.clone()));
        conversation.push(Message::user(input));

        info!(session_id = %ctx.session_id, stage = %spec.kind, "Running stage");

        let outcome = self.drive(spec, &mut conversation, ctx).await;
        self.finish(outcome, conversation, ctx)
    }

    async fn drive(
        &self,
        spec: &StageSpec,
        conversation: &mut Conversation,
        ctx: &mut RequestContext,
    ) -> StageOutcome {
        let mut run = StageRun::new(spec.kind);

        loop {
            // AWAIT_MODEL
            if ctx.is_cancelled() {
                return run.cancelled();
            }
            let request = self.build_request(spec, conversation);
            run.model_calls += 1;

            let response = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return run.cancelled(),
                result = self.complete(request) => result,
            };

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    run.failures += 1;
                    warn!(
                        stage = %spec.kind,
                        attempt = run.failures,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Provider call failed"
                    );
                    self.event_bus.publish(DomainEvent::ErrorOccurred {
                        context: format!("{} stage", spec.kind),
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    if !e.is_retryable() || run.failures >= self.max_attempts {
                        return run.degraded();
                    }
                    conversation.push(Message::tool(
                        None,
                        failure_observation("provider_error", &e.to_string()),
                    ));

                    let mut delay = self.backoff(run.failures - 1);
                    if let ProviderError::RateLimited { retry_after_secs } = &e {
                        delay = delay.max(Duration::from_secs(*retry_after_secs));
                    }
                    tokio::select! {
                        biased;
                        _ = ctx.cancel.cancelled() => return run.cancelled(),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
            };

            if let Some(usage) = &response.usage {
                ctx.token_usage.add(usage);
                self.event_bus.publish(DomainEvent::ResponseGenerated {
                    session_id: ctx.session_id.clone(),
                    stage: spec.kind.to_string(),
                    model: response.model.clone(),
                    tokens_used: usage.total_tokens,
                    timestamp: Utc::now(),
                });
            }

            let mut message = response.message;
            let text = strip_reasoning(&message.content).trim().to_string();

            if spec.tools.is_empty() {
                conversation.push(message);
                return run.completed(text);
            }

            // HAVE_CALL? One call per turn; unanswered native ids would
            // make the next request invalid.
            if message.tool_calls.len() > 1 {
                debug!(
                    stage = %spec.kind,
                    dropped = message.tool_calls.len() - 1,
                    "Only the first native tool call is executed"
                );
                message.tool_calls.truncate(1);
            }
            let (extraction, native) = match native_call(&message) {
                Some(extraction) => (extraction, true),
                None => (extract(&text), false),
            };
            conversation.push(message);

            let call = match extraction {
                Extraction::NotFound => return run.completed(text),
                Extraction::Malformed(malformed) => {
                    warn!(stage = %spec.kind, reason = %malformed, "Malformed tool call, using text reply");
                    self.event_bus.publish(DomainEvent::ErrorOccurred {
                        context: format!("{} stage", spec.kind),
                        error_message: malformed.to_string(),
                        timestamp: Utc::now(),
                    });
                    return run.completed(text);
                }
                Extraction::Found(call) => call,
            };

            if run.dispatched >= spec.max_tool_calls {
                debug!(stage = %spec.kind, tool = %call.name, "Tool call limit reached, using text reply");
                return run.completed(text);
            }

            // HAVE_CALL -> HAVE_RESULT
            run.tool_calls += 1;
            let result = match ToolKind::from_name(&call.name) {
                Some(kind) if !spec.allows(kind) => unavailable(&call, spec),
                _ => tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => return run.cancelled(),
                    result = self.dispatcher.dispatch_for(
                        &call,
                        Some(&ctx.session_id),
                        Some(&ctx.request_id),
                    ) => result,
                },
            };

            // A text-extracted call has no provider-side id to answer.
            let reply_to = native.then(|| call.id.clone());
            conversation.push(Message::tool(reply_to, result.to_observation()));

            let ok = result.ok;
            run.tool_result = Some(result);

            if ok {
                run.dispatched += 1;
                if !spec.incorporate_results {
                    return run.completed(String::new());
                }
                continue;
            }

            run.failures += 1;
            if run.failures >= self.max_attempts {
                warn!(stage = %spec.kind, attempts = run.failures, "Failure budget exhausted");
                return run.degraded();
            }
        }
    }

    fn finish(
        &self,
        outcome: StageOutcome,
        conversation: Conversation,
        ctx: &mut RequestContext,
    ) -> StageOutcome {
        info!(
            session_id = %ctx.session_id,
            stage = %outcome.stage,
            status = outcome.status.as_str(),
            model_calls = outcome.model_calls,
            tool_calls = outcome.tool_calls,
            "Stage finished"
        );
        self.event_bus.publish(DomainEvent::StageCompleted {
            session_id: ctx.session_id.clone(),
            stage: outcome.stage.to_string(),
            status: outcome.status.as_str().to_string(),
            model_calls: outcome.model_calls,
            tool_calls: outcome.tool_calls,
            timestamp: Utc::now(),
        });
        ctx.transcripts.push((outcome.stage, conversation));
        outcome
    }
}

/// The first native tool call on `message`, if any.
fn native_call(message: &Message) -> Option<Extraction> {
    let tc = message.tool_calls.first()?;
    let raw = tc.arguments.trim();
    let arguments = if raw.is_empty() {
        Some(Map::new())
    } else {
        serde_json::from_str::<Map<String, Value>>(raw)
            .or_else(|_| serde_json::from_str(&repair(raw)))
            .ok()
    };

    Some(match arguments {
        Some(arguments) => Extraction::Found(ToolCall {
            id: tc.id.clone(),
            name: tc.name.clone(),
            arguments,
        }),
        None => Extraction::Malformed(MalformedCall {
            name: Some(tc.name.clone()),
            reason: "arguments are not a JSON object".into(),
        }),
    })
}

fn unavailable(call: &ToolCall, spec: &StageSpec) -> ToolResult {
    let available: Vec<&str> = spec.tools.iter().map(|k| k.name()).collect();
    ToolResult::failure(
        call,
        DispatchErrorKind::UnknownTool,
        format!(
            "tool '{}' is not available in the {} stage, available tools: {}",
            call.name,
            spec.kind,
            available.join(", ")
        ),
    )
}

fn failure_observation(error: &str, detail: &str) -> String {
    serde_json::json!({ "ok": false, "error": error, "detail": detail }).to_string()
}
