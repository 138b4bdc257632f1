//! Per-request state threaded through the turn loop.

use crate::stage::StageKind;
use salesdesk_core::message::Conversation;
use salesdesk_core::provider::Usage;
use tokio_util::sync::CancellationToken;

/// State owned by exactly one pipeline request.
///
/// Nothing here is shared between requests; the pipeline only holds
/// `Arc` handles to the provider, dispatcher and event bus.
#[derive(Debug)]
pub struct RequestContext {
    pub session_id: String,
    /// Fresh for every request; scopes order deduplication
    pub request_id: String,
    pub user_id: String,
    pub cancel: CancellationToken,
    /// Finished stage transcripts, in execution order
    pub transcripts: Vec<(StageKind, Conversation)>,
    pub token_usage: Usage,
}

impl RequestContext {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            cancel,
            transcripts: Vec::new(),
            token_usage: Usage::default(),
        }
    }

    pub fn transcript(&self, stage: StageKind) -> Option<&Conversation> {
        self.transcripts
            .iter()
            .find(|(kind, _)| *kind == stage)
            .map(|(_, conversation)| conversation)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
