//! Tool vocabulary — what the model may ask for and what it gets back.
//!
//! The set of tools is closed: [`ToolKind`] enumerates every operation the
//! dispatcher knows how to run. A name that does not map to a variant is
//! rejected before any collaborator is touched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::provider::ToolDefinition;

/// A structured call extracted from model output.
///
/// Invariant: `name` is non-empty and `arguments` is a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID (the provider's tool_call id, or generated for text calls)
    pub id: String,

    /// Name of the tool to execute, as written by the model
    pub name: String,

    /// Arguments object
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    /// Build a call with a generated id.
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        let name = name.into();
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name,
            arguments,
        }
    }
}

/// Every operation the dispatcher can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Look up price and stock for a product
    CheckInventoryDetail,
    /// Persist a new order
    CreateCustomerOrder,
    /// Read back an existing order
    GetOrder,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [
        ToolKind::CheckInventoryDetail,
        ToolKind::CreateCustomerOrder,
        ToolKind::GetOrder,
    ];

    /// The wire name the model uses.
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::CheckInventoryDetail => "check_inventory_detail",
            ToolKind::CreateCustomerOrder => "create_customer_order",
            ToolKind::GetOrder => "get_order",
        }
    }

    /// Resolve a model-supplied name. Exact match only.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::CheckInventoryDetail => {
                "Check stock status, price and remaining quantity of a product. \
                 Storage and color are optional filters."
            }
            ToolKind::CreateCustomerOrder => {
                "Create a customer order for an in-stock product. Returns the order id."
            }
            ToolKind::GetOrder => "Retrieve a previously created order by its order id.",
        }
    }

    /// JSON Schema of the arguments object.
    pub fn parameters_schema(&self) -> Value {
        match self {
            ToolKind::CheckInventoryDetail => serde_json::json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Product name, e.g. 'iPhone 15 Pro Max'" },
                    "storage": { "type": "string", "description": "Storage capacity, e.g. '256GB' (optional)" },
                    "color": { "type": "string", "description": "Color variant (optional)" }
                },
                "required": ["name"]
            }),
            ToolKind::CreateCustomerOrder => serde_json::json!({
                "type": "object",
                "properties": {
                    "order_details": {
                        "type": "object",
                        "properties": {
                            "product": { "type": "string" },
                            "storage": { "type": "string" },
                            "color": { "type": "string" },
                            "quantity": { "type": "integer", "minimum": 1 },
                            "total_price": { "type": "number" },
                            "customer_info": {
                                "type": "object",
                                "properties": {
                                    "customer_name": { "type": "string" },
                                    "conversation_id": { "type": "string" }
                                }
                            }
                        },
                        "required": ["product", "quantity", "customer_info"]
                    }
                },
                "required": ["order_details"]
            }),
            ToolKind::GetOrder => serde_json::json!({
                "type": "object",
                "properties": {
                    "order_id": { "type": "string" }
                },
                "required": ["order_id"]
            }),
        }
    }

    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a dispatch did not produce a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchErrorKind {
    UnknownTool,
    InvalidArguments,
    UpstreamError,
}

impl DispatchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchErrorKind::UnknownTool => "unknown_tool",
            DispatchErrorKind::InvalidArguments => "invalid_arguments",
            DispatchErrorKind::UpstreamError => "upstream_error",
        }
    }
}

impl std::fmt::Display for DispatchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of dispatching one [`ToolCall`].
///
/// Exactly one of `payload` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Name of the tool as requested
    pub tool: String,

    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DispatchErrorKind>,

    /// Human-readable failure detail, fed back to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ToolResult {
    pub fn success(call: &ToolCall, payload: Value) -> Self {
        Self {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            ok: true,
            payload: Some(payload),
            error: None,
            detail: None,
        }
    }

    pub fn failure(call: &ToolCall, kind: DispatchErrorKind, detail: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            ok: false,
            payload: None,
            error: Some(kind),
            detail: Some(detail.into()),
        }
    }

    /// Render as the content of a `tool` turn.
    pub fn to_observation(&self) -> String {
        let body = match (&self.payload, &self.error) {
            (Some(payload), _) => serde_json::json!({ "ok": true, "result": payload }),
            (None, kind) => serde_json::json!({
                "ok": false,
                "error": kind.map(|k| k.as_str()),
                "detail": self.detail,
            }),
        };
        body.to_string()
    }
}
