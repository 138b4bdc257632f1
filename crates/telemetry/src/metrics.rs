//! Thread-safe metrics collector and request timer.

use salesdesk_core::event::{DomainEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Counters {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    total_response_time: Duration,
    total_tokens_used: u64,
    requests_by_intent: BTreeMap<String, u64>,
    errors_by_type: BTreeMap<String, u64>,
    tool_calls: u64,
    tool_failures: u64,
}

/// Point-in-time view of the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: f64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate_percent: f64,
    pub average_response_time_seconds: f64,
    pub total_tokens_used: u64,
    pub requests_per_minute: f64,
    pub requests_by_intent: BTreeMap<String, u64>,
    pub errors_by_type: BTreeMap<String, u64>,
    pub tool_calls: u64,
    pub tool_failures: u64,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Collects request metrics. Share it behind an `Arc`.
pub struct MetricsCollector {
    started: RwLock<Instant>,
    counters: RwLock<Counters>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            started: RwLock::new(Instant::now()),
            counters: RwLock::new(Counters::default()),
        }
    }

    // A panicking writer leaves plain counters behind; keep using them.
    fn read(&self) -> RwLockReadGuard<'_, Counters> {
        self.counters.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Counters> {
        self.counters.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Record one finished request.
    pub fn record_request(
        &self,
        success: bool,
        response_time: Duration,
        intent: Option<&str>,
        tokens_used: Option<u64>,
        error_type: Option<&str>,
    ) {
        let mut c = self.write();
        c.total_requests += 1;
        if success {
            c.successful_requests += 1;
        } else {
            c.failed_requests += 1;
            if let Some(kind) = error_type {
                *c.errors_by_type.entry(kind.to_string()).or_default() += 1;
            }
        }
        c.total_response_time += response_time;
        if let Some(intent) = intent {
            *c.requests_by_intent.entry(intent.to_string()).or_default() += 1;
        }
        if let Some(tokens) = tokens_used {
            c.total_tokens_used += tokens;
        }
    }

    /// Fold a domain event into the counters.
    pub fn record_event(&self, event: &DomainEvent) {
        if let DomainEvent::ToolExecuted { success, error, .. } = event {
            let mut c = self.write();
            c.tool_calls += 1;
            if !success {
                c.tool_failures += 1;
                let kind = error.as_deref().unwrap_or("tool_failure");
                *c.errors_by_type.entry(kind.to_string()).or_default() += 1;
            }
        }
    }

    /// Follow `bus` until it closes.
    pub fn spawn_listener(self: &Arc<Self>, bus: &EventBus) -> tokio::task::JoinHandle<()> {
        let mut rx = bus.subscribe();
        let collector = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => collector.record_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Metrics listener lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self
            .started
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
            .as_secs_f64();
        let c = self.read();

        let average = if c.total_requests > 0 {
            c.total_response_time.as_secs_f64() / c.total_requests as f64
        } else {
            0.0
        };
        let success_rate = if c.total_requests > 0 {
            c.successful_requests as f64 / c.total_requests as f64 * 100.0
        } else {
            0.0
        };
        let per_minute = if uptime > 0.0 {
            c.total_requests as f64 / (uptime / 60.0)
        } else {
            0.0
        };

        MetricsSnapshot {
            uptime_seconds: uptime,
            total_requests: c.total_requests,
            successful_requests: c.successful_requests,
            failed_requests: c.failed_requests,
            success_rate_percent: round_to(success_rate, 2),
            average_response_time_seconds: round_to(average, 3),
            total_tokens_used: c.total_tokens_used,
            requests_per_minute: round_to(per_minute, 2),
            requests_by_intent: c.requests_by_intent.clone(),
            errors_by_type: c.errors_by_type.clone(),
            tool_calls: c.tool_calls,
            tool_failures: c.tool_failures,
        }
    }

    /// Clear all counters and restart the uptime clock.
    pub fn reset(&self) {
        *self.write() = Counters::default();
        *self.started.write().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub fn log_metrics(&self) {
        let s = self.snapshot();
        info!(
            total_requests = s.total_requests,
            success_rate_percent = s.success_rate_percent,
            average_response_time_seconds = s.average_response_time_seconds,
            total_tokens_used = s.total_tokens_used,
            tool_calls = s.tool_calls,
            tool_failures = s.tool_failures,
            by_intent = ?s.requests_by_intent,
            errors = ?s.errors_by_type,
            "System metrics"
        );
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Measures one operation and logs its duration when finished.
pub struct RequestTimer {
    name: String,
    started: Instant,
}

impl RequestTimer {
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop the timer, log the outcome, and return the elapsed time.
    pub fn finish(self, success: bool) -> Duration {
        let elapsed = self.started.elapsed();
        if success {
            debug!(name = %self.name, elapsed_ms = elapsed.as_millis() as u64, "Completed");
        } else {
            warn!(name = %self.name, elapsed_ms = elapsed.as_millis() as u64, "Failed");
        }
        elapsed
    }
}
