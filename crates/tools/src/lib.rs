//! Structured tool calls for salesdesk.
//!
//! [`extract`] pulls a call out of free-form model output; [`Dispatcher`]
//! validates it against the closed tool set and runs it against the store
//! with bounded, timed retries.

pub mod dispatch;
pub mod extract;
pub mod retry;

pub use dispatch::{Dispatcher, GetOrderArgs, InventoryLookupArgs, OrderArgs, idempotency_key};
pub use extract::{Extraction, MalformedCall, extract, extract_json_object, repair, strip_reasoning};
pub use retry::{RetryExhausted, RetryPolicy};
