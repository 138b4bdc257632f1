//! The four pipeline stages and their prompts.

use salesdesk_core::tool::ToolKind;
use serde::{Deserialize, Serialize};

/// One fixed role in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Analysis,
    Inventory,
    Order,
    Consultant,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Analysis => "analysis",
            StageKind::Inventory => "inventory",
            StageKind::Order => "order",
            StageKind::Consultant => "consultant",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the turn loop needs to run one stage.
#[derive(Debug, Clone)]
pub struct StageSpec {
    pub kind: StageKind,
    pub system_prompt: String,
    /// Tools the stage may call. Empty means the first reply is final.
    pub tools: Vec<ToolKind>,
    /// Successful dispatches allowed before the model's text is taken as-is
    pub max_tool_calls: u32,
    /// Loop back to the model after a successful tool call instead of
    /// returning the raw tool observation.
    pub incorporate_results: bool,
}

impl StageSpec {
    pub fn analysis() -> Self {
        Self {
            kind: StageKind::Analysis,
            system_prompt: ANALYSIS_PROMPT.to_string(),
            tools: Vec::new(),
            max_tool_calls: 0,
            incorporate_results: false,
        }
    }

    pub fn inventory(incorporate_results: bool) -> Self {
        Self {
            kind: StageKind::Inventory,
            system_prompt: INVENTORY_PROMPT.to_string(),
            tools: vec![ToolKind::CheckInventoryDetail],
            max_tool_calls: 1,
            incorporate_results,
        }
    }

    pub fn order(incorporate_results: bool) -> Self {
        Self {
            kind: StageKind::Order,
            system_prompt: ORDER_PROMPT.to_string(),
            tools: vec![ToolKind::CreateCustomerOrder, ToolKind::GetOrder],
            max_tool_calls: 1,
            incorporate_results,
        }
    }

    pub fn consultant(reply_language: &str) -> Self {
        Self {
            kind: StageKind::Consultant,
            system_prompt: CONSULTANT_PROMPT.replace("{language}", reply_language),
            tools: Vec::new(),
            max_tool_calls: 0,
            incorporate_results: false,
        }
    }

    pub fn allows(&self, tool: ToolKind) -> bool {
        self.tools.contains(&tool)
    }
}

const ANALYSIS_PROMPT: &str = r#"You analyse customer requests for an electronics shop.

Identify:
1. The product (or product type) the customer is interested in, with any storage or color details.
2. The customer's main intent.

Reply with a single JSON object and nothing else (no markdown fences):
{"product_details": {"name": "...", "storage": "...", "color": "...", "quantity": 1},
 "customer_intent": "check_inventory_price" | "place_order" | "product_info" | "general_query",
 "original_query": "...",
 "requires_inventory_check": true | false,
 "requires_order_placement": true | false}

Set requires_order_placement only when the customer clearly wants to buy.
Example:
{"product_details": {"name": "iPhone 15 Pro Max", "storage": "256GB", "color": "Titan tự nhiên", "quantity": 1}, "customer_intent": "place_order", "original_query": "Tôi muốn mua iPhone 15 Pro Max 256GB", "requires_inventory_check": true, "requires_order_placement": true}"#;

const INVENTORY_PROMPT: &str = r#"You check product stock for an electronics shop.

Step 1: call the inventory tool. Never invent stock data. Use exactly this format:
TOOL_CALL: check_inventory_detail
ARGS: {"product": "iPhone 15 Pro Max", "storage": "256GB", "color": "Titan tự nhiên"}

Leave out storage or color when the customer did not mention them.

Step 2: after the tool result arrives, reply with one JSON object and nothing else:
{"product_name": "...", "storage": "...", "color": "...", "stock_status": "in_stock" | "out_of_stock" | "not_found", "price": 0, "quantity": 0}"#;

const ORDER_PROMPT: &str = r#"You place orders for an electronics shop. You must call a tool; never write code or pretend an order exists.

Only order a product the inventory result shows as in stock. To create the order reply with exactly:
TOOL_CALL: create_customer_order
ARGS: {"order_details": {"product": "iPhone 15 Pro Max", "storage": "256GB", "color": "Titan tự nhiên", "quantity": 1, "total_price": 27990000, "customer_info": {"customer_name": "Nguyễn Văn A", "conversation_id": "<session id>"}}}

To look up an existing order reply with:
TOOL_CALL: get_order
ARGS: {"order_id": "order_..."}

The shop assigns the order id; do not make one up.
After the tool result arrives, reply with one JSON object and nothing else:
{"order_created": true | false, "order_id": "...", "order_details": {...}, "message": "..."}"#;

const CONSULTANT_PROMPT: &str = r#"You are a friendly sales consultant for an electronics shop. Write the final reply to the customer in {language}.

Use only the facts from the earlier steps (analysis, inventory, order). Reply in natural prose, not JSON, and never show internal reasoning.

- Order created: thank the customer and list the product, price and order id.
- Price or stock question: state the remaining quantity and price, then offer to place an order.
- Out of stock or not found: apologise and offer similar products.
- Anything else: answer helpfully and briefly."#;
