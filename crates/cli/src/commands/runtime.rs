//! Shared wiring: config → store → dispatcher → pipeline.

use salesdesk_agent::SalesPipeline;
use salesdesk_config::AppConfig;
use salesdesk_core::event::EventBus;
use salesdesk_core::{Error, Result, Store};
use salesdesk_telemetry::MetricsCollector;
use salesdesk_tools::{Dispatcher, RetryPolicy};
use std::sync::Arc;

pub struct Runtime {
    pub config: AppConfig,
    pub store: Arc<dyn Store>,
    pub metrics: Arc<MetricsCollector>,
    pub pipeline: SalesPipeline,
}

pub fn load_config() -> Result<AppConfig> {
    AppConfig::load().map_err(|e| Error::config(format!("failed to load config: {e}")))
}

pub fn retry_policy(config: &AppConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: config.pipeline.max_attempts,
        timeout: config.pipeline.tool_timeout(),
        backoff_base: config.pipeline.backoff_base(),
    }
}

impl Runtime {
    /// Open the store and provider once; every request reuses them.
    pub async fn build(config: AppConfig) -> Result<Self> {
        if !config.has_api_key() {
            tracing::warn!(
                "No API key configured; set SALESDESK_API_KEY, API_KEY or OPENAI_API_KEY if the server needs one"
            );
        }

        let store = salesdesk_store::open_from_config(&config.store)
            .await
            .inspect_err(|e| {
                tracing::error!(backend = ?config.store.backend, error = %e, "Failed to open store")
            })?;
        let provider = salesdesk_providers::build_from_config(&config)?;

        let event_bus = Arc::new(EventBus::default());
        let metrics = Arc::new(MetricsCollector::new());
        metrics.spawn_listener(&event_bus);

        let dispatcher = Arc::new(
            Dispatcher::new(store.clone(), retry_policy(&config)).with_event_bus(event_bus.clone()),
        );
        let pipeline = SalesPipeline::from_config(&config, provider, dispatcher, event_bus)
            .with_metrics(metrics.clone());

        tracing::debug!(
            store = store.name(),
            model = %config.llm.model,
            api_url = %config.llm.api_url,
            "Runtime ready"
        );

        Ok(Self {
            config,
            store,
            metrics,
            pipeline,
        })
    }
}

/// Cancel `token` on Ctrl+C. Dropping the handle does not stop the watcher;
/// abort it once the request is done.
pub fn cancel_on_ctrl_c(token: tokio_util::sync::CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Cancelling...");
            token.cancel();
        }
    })
}
