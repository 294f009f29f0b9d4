use async_trait::async_trait;

use taskhive_common::{ConversationId, MessageId, Result, UserId};

/// Storage contract for per-participant read cursors.
#[async_trait]
pub trait Data: Send + Sync {
    /// The participant's cursor, `None` when nothing was ever read.
    async fn marker_get(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<Option<MessageId>>;

    /// Monotone upsert: the stored cursor becomes
    /// `max(current, message_id)`. Returns the resulting cursor. The
    /// merge must happen inside the store so two near-simultaneous
    /// acks arriving out of order cannot regress the cursor.
    async fn marker_advance(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<MessageId>;

    /// Adds the user to the message's seen set (add-to-set semantics:
    /// no duplicates, order irrelevant). Returns whether the entry was
    /// newly added. `NotFound` if the message does not exist.
    async fn seen_add(&self, message_id: MessageId, user_id: UserId) -> Result<bool>;
}
