//! The turn loop and the fixed sales pipeline built on it.
//!
//! A customer request flows through four prompted stages:
//!
//! 1. **Analysis**: read intent and product details as JSON
//! 2. **Inventory**: one `check_inventory_detail` call, when asked for
//! 3. **Order**: one `create_customer_order` / `get_order` call, when asked for
//! 4. **Consultant**: the natural-language reply
//!
//! Each stage is one run of the [`TurnLoop`]. Stages never return errors;
//! failures surface as degraded outcomes.

pub mod context;
pub mod pipeline;
pub mod stage;
pub mod turn_loop;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::RequestContext;
pub use pipeline::{
    APOLOGY_REPLY, AnalysisResult, CustomerIntent, PipelineRequest, PipelineResponse,
    PipelineStatus, SalesPipeline,
};
pub use stage::{StageKind, StageSpec};
pub use turn_loop::{DEGRADED_REPLY, StageOutcome, StageStatus, TurnLoop};
pub use tokio_util::sync::CancellationToken;
