use async_trait::async_trait;

use taskhive_common::{Conversation, ConversationId, ConversationStatus, Member, Result, UserId};

/// Storage contract for conversations (task threads and groups).
#[async_trait]
pub trait Data: Send + Sync {
    async fn conversation_create(&self, conversation: &Conversation) -> Result<()>;

    async fn conversation_get(&self, id: ConversationId) -> Result<Option<Conversation>>;

    async fn conversation_set_status(
        &self,
        id: ConversationId,
        status: ConversationStatus,
    ) -> Result<()>;

    /// Replaces a group conversation's member list. Task threads have
    /// a fixed participant pair and reject this.
    async fn conversation_set_members(
        &self,
        id: ConversationId,
        members: &[Member],
    ) -> Result<()>;

    /// Every conversation the user participates in, for the batched
    /// unread summary.
    async fn conversations_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>>;
}
