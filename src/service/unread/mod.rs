// =============================================================================
// Taskhive Planning Backend - Unread Counter
// =============================================================================
//
// Description:
//   Derives unread counts on demand from the read cursor and the
//   message collection. Deliberately lazy: keeping a running counter
//   would amplify every message write into N participant updates,
//   while counts are only ever requested for a bounded conversation
//   list.
//
// =============================================================================

use std::sync::Arc;

use tracing::instrument;

use taskhive_common::{ConversationId, Result, UserId};

use crate::service::{conversations, messages, read_marker};

/// One row of the batched unread summary.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct UnreadEntry {
    pub conversation_id: ConversationId,
    pub unread: u64,
}

pub struct Service {
    pub conversations: Arc<dyn conversations::Data>,
    pub messages: Arc<dyn messages::Data>,
    pub markers: Arc<dyn read_marker::Data>,
}

impl Service {
    pub fn new(
        conversations: Arc<dyn conversations::Data>,
        messages: Arc<dyn messages::Data>,
        markers: Arc<dyn read_marker::Data>,
    ) -> Self {
        Self {
            conversations,
            messages,
            markers,
        }
    }

    /// Messages with an id greater than the participant's cursor.
    ///
    /// An absent cursor counts the whole backlog; a cursor at or past
    /// the latest id yields 0, never a negative.
    #[instrument(skip(self))]
    pub async fn count(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<u64> {
        let marker = self.markers.marker_get(conversation_id, user_id).await?;
        self.messages.count_after(conversation_id, marker).await
    }

    /// Unread counts for every conversation the user participates in,
    /// resolved in one store pass instead of one query per row.
    #[instrument(skip(self))]
    pub async fn count_for_user(&self, user_id: UserId) -> Result<Vec<UnreadEntry>> {
        let conversations = self.conversations.conversations_for_user(user_id).await?;
        let ids: Vec<ConversationId> = conversations.iter().map(|c| c.id).collect();
        let counts = self.messages.unread_counts(user_id, &ids).await?;
        Ok(ids
            .into_iter()
            .map(|conversation_id| UnreadEntry {
                conversation_id,
                unread: counts.get(&conversation_id).copied().unwrap_or(0),
            })
            .collect())
    }
}
