use std::sync::Arc;
use tracing::instrument;

use crate::error::AppResult;
use crate::models::{HistoryEntry, MessagePayload, MessageTarget, StoredMessage, UserId};
use crate::storage::MessageStore;

/// Durable direct-message history, written independently of live routing
#[derive(Clone)]
pub struct HistoryService {
    messages: Arc<dyn MessageStore>,
}

impl HistoryService {
    pub fn new(messages: Arc<dyn MessageStore>) -> Self {
        Self { messages }
    }

    #[instrument(skip(self, payload))]
    pub async fn append_direct(
        &self,
        from: UserId,
        to: UserId,
        payload: MessagePayload,
    ) -> AppResult<StoredMessage> {
        let stored = self
            .messages
            .append(from, MessageTarget::Direct(to), payload)
            .await?;
        tracing::debug!(seq = stored.seq, "direct message stored");
        Ok(stored)
    }

    /// Conversation between `viewer` and `peer`, oldest first, from the viewer's side
    pub async fn fetch(&self, viewer: UserId, peer: UserId) -> AppResult<Vec<HistoryEntry>> {
        let messages = self.messages.conversation(viewer, peer).await?;
        Ok(messages
            .iter()
            .map(|m| HistoryEntry::for_viewer(m, viewer))
            .collect())
    }
}
