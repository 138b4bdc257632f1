//! Request metrics for salesdesk.
//!
//! A [`MetricsCollector`] is shared across requests and records outcome,
//! latency, intent and token usage per pipeline run. It can also follow
//! the domain event bus to count tool executions.

pub mod metrics;

pub use metrics::{MetricsCollector, MetricsSnapshot, RequestTimer};
