//! # salesdesk core
//!
//! Domain types, collaborator traits, and error definitions for the salesdesk
//! sales pipeline. This crate has **no I/O of its own**: it defines the model
//! that the provider, store, tool, and agent crates implement against.
//!
//! ## Collaborators
//!
//! The pipeline talks to the outside world through two narrow traits:
//! - [`Provider`] — an LLM completion backend
//! - [`Store`] — the product/order document store
//!
//! Everything else (extraction, dispatch, the turn loop) is built on top of
//! these, so tests can swap in scripted mocks.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StoreError};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use store::{
    CustomerInfo, OrderReceipt, OrderRecord, OrderRequest, ProductLookup, ProductQuery,
    ProductRecord, StockStatus, Store,
};
pub use tool::{DispatchErrorKind, ToolCall, ToolKind, ToolResult};
