// =============================================================================
// Taskhive Planning Backend - Read-Cursor Store
// =============================================================================
//
// Description:
//   One cursor per (conversation, participant): the id of the last
//   message that participant has acknowledged. Cursor advancement is a
//   monotone max-merge, never last-write-wins. Group threads
//   additionally keep per-message seen-by receipts (set semantics).
//
// =============================================================================

mod data;
pub use data::Data;

use std::sync::Arc;

use tracing::instrument;

use taskhive_common::{ConversationId, MessageId, Result, UserId};

pub struct Service {
    pub db: Arc<dyn Data>,
}

impl Service {
    pub fn new(db: Arc<dyn Data>) -> Self {
        Self { db }
    }

    /// Never fails on absence: an absent cursor means "never read".
    pub async fn marker(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<Option<MessageId>> {
        self.db.marker_get(conversation_id, user_id).await
    }

    /// Advances the participant's cursor to `max(current, message_id)`.
    ///
    /// Idempotent; a stale or duplicate ack is a silent no-op rather
    /// than a conflict error.
    #[instrument(skip(self))]
    pub async fn advance(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<MessageId> {
        self.db
            .marker_advance(conversation_id, user_id, message_id)
            .await
    }

    /// Per-message receipt for group threads: adds the user to the
    /// message's seen set. Idempotent; returns whether this call added
    /// the entry.
    pub async fn mark_seen(&self, message_id: MessageId, user_id: UserId) -> Result<bool> {
        self.db.seen_add(message_id, user_id).await
    }
}
