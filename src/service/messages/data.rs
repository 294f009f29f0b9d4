use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use taskhive_common::{ConversationId, Message, MessageId, Result, UserId};

/// Fields of a message a store is asked to persist; the store assigns
/// the id (next value of its monotonic sequence) and returns the
/// completed record.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub author_id: UserId,
    pub content: String,
    pub is_file: bool,
    pub mentions: Vec<UserId>,
    pub reply_to: Option<MessageId>,
    pub created_at: DateTime<Utc>,
}

/// Storage contract for messages/comments.
#[async_trait]
pub trait Data: Send + Sync {
    async fn message_create(&self, new: NewMessage) -> Result<Message>;

    async fn message_get(&self, id: MessageId) -> Result<Option<Message>>;

    /// Overwrites content and mentions of an existing message.
    async fn message_update(
        &self,
        id: MessageId,
        content: &str,
        mentions: &[UserId],
    ) -> Result<()>;

    /// Reverse pagination: page 1 is the newest `limit` messages,
    /// higher pages walk toward the start; each page is returned in
    /// ascending id order.
    async fn messages_page(
        &self,
        conversation_id: ConversationId,
        page: u64,
        limit: u64,
    ) -> Result<Vec<Message>>;

    /// Count of messages with `id > after` (total count when `after`
    /// is `None`).
    async fn count_after(
        &self,
        conversation_id: ConversationId,
        after: Option<MessageId>,
    ) -> Result<u64>;

    async fn latest_message_id(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<MessageId>>;

    /// Per-conversation unread counts for the user across the given
    /// conversations, joining messages against the user's cursors in
    /// one pass.
    async fn unread_counts(
        &self,
        user_id: UserId,
        conversations: &[ConversationId],
    ) -> Result<BTreeMap<ConversationId, u64>>;
}
