// =============================================================================
// Taskhive Planning Backend - In-Memory Store
// =============================================================================
//
// Description:
//   Volatile reference backend over RwLock'd BTreeMaps. Message ids
//   come from a process-wide AtomicU64 sequence. Used by the test
//   suite and the default dev configuration; everything here mirrors
//   the semantics the postgres backend provides with SQL.
//
// =============================================================================

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use taskhive_common::{
    Conversation, ConversationId, ConversationKind, ConversationStatus, Error, Member, Message,
    MessageId, Notification, NotificationId, Result, UserId,
};

use crate::service::messages::NewMessage;
use crate::service::{conversations, messages, notifications, read_marker};

#[derive(Default)]
pub struct MemoryDatabase {
    sequence: AtomicU64,
    conversations: RwLock<BTreeMap<ConversationId, Conversation>>,
    messages: RwLock<BTreeMap<MessageId, Message>>,
    /// Per-conversation index into `messages`, ordered by id.
    by_conversation: RwLock<BTreeMap<ConversationId, BTreeSet<MessageId>>>,
    markers: RwLock<BTreeMap<(ConversationId, UserId), MessageId>>,
    notifications: RwLock<BTreeMap<NotificationId, Notification>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_message_id(&self) -> MessageId {
        MessageId(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl conversations::Data for MemoryDatabase {
    async fn conversation_create(&self, conversation: &Conversation) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        if conversations.contains_key(&conversation.id) {
            return Err(Error::Conflict(format!(
                "conversation {} already exists",
                conversation.id
            )));
        }
        conversations.insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn conversation_get(&self, id: ConversationId) -> Result<Option<Conversation>> {
        Ok(self.conversations.read().await.get(&id).cloned())
    }

    async fn conversation_set_status(
        &self,
        id: ConversationId,
        status: ConversationStatus,
    ) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("conversation {id}")))?;
        conversation.status = status;
        Ok(())
    }

    async fn conversation_set_members(
        &self,
        id: ConversationId,
        members: &[Member],
    ) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("conversation {id}")))?;
        match &mut conversation.kind {
            ConversationKind::Group { members: current } => {
                *current = members.to_vec();
                Ok(())
            }
            ConversationKind::Task { .. } => Err(Error::InvalidArgument(
                "task threads have a fixed participant pair".into(),
            )),
        }
    }

    async fn conversations_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>> {
        Ok(self
            .conversations
            .read()
            .await
            .values()
            .filter(|c| c.is_participant(user_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl messages::Data for MemoryDatabase {
    async fn message_create(&self, new: NewMessage) -> Result<Message> {
        let message = Message {
            id: self.next_message_id(),
            conversation_id: new.conversation_id,
            author_id: new.author_id,
            content: new.content,
            is_file: new.is_file,
            mentions: new.mentions,
            seen_by: Vec::new(),
            reply_to: new.reply_to,
            created_at: new.created_at,
        };
        self.messages
            .write()
            .await
            .insert(message.id, message.clone());
        self.by_conversation
            .write()
            .await
            .entry(message.conversation_id)
            .or_default()
            .insert(message.id);
        Ok(message)
    }

    async fn message_get(&self, id: MessageId) -> Result<Option<Message>> {
        Ok(self.messages.read().await.get(&id).cloned())
    }

    async fn message_update(
        &self,
        id: MessageId,
        content: &str,
        mentions: &[UserId],
    ) -> Result<()> {
        let mut messages = self.messages.write().await;
        let message = messages
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("message {id}")))?;
        message.content = content.to_owned();
        message.mentions = mentions.to_vec();
        Ok(())
    }

    async fn messages_page(
        &self,
        conversation_id: ConversationId,
        page: u64,
        limit: u64,
    ) -> Result<Vec<Message>> {
        let page = page.max(1);
        let index = self.by_conversation.read().await;
        let Some(ids) = index.get(&conversation_id) else {
            return Ok(Vec::new());
        };
        let total = ids.len() as u64;
        // Reverse pagination: page 1 is the newest window, ascending
        // order inside the page. Saturating math: page/limit come from
        // the query string, so the product can exceed u64.
        let skip = total.saturating_sub(page.saturating_mul(limit));
        let messages = self.messages.read().await;
        Ok(ids
            .iter()
            .skip(skip as usize)
            .take(limit as usize)
            .filter_map(|id| messages.get(id).cloned())
            .collect())
    }

    async fn count_after(
        &self,
        conversation_id: ConversationId,
        after: Option<MessageId>,
    ) -> Result<u64> {
        let index = self.by_conversation.read().await;
        let Some(ids) = index.get(&conversation_id) else {
            return Ok(0);
        };
        let count = match after {
            None => ids.len(),
            Some(after) => ids
                .range((Bound::Excluded(after), Bound::Unbounded))
                .count(),
        };
        Ok(count as u64)
    }

    async fn latest_message_id(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<MessageId>> {
        Ok(self
            .by_conversation
            .read()
            .await
            .get(&conversation_id)
            .and_then(|ids| ids.last().copied()))
    }

    async fn unread_counts(
        &self,
        user_id: UserId,
        conversations: &[ConversationId],
    ) -> Result<BTreeMap<ConversationId, u64>> {
        let index = self.by_conversation.read().await;
        let markers = self.markers.read().await;
        let mut counts = BTreeMap::new();
        for conversation_id in conversations {
            let unread = match index.get(conversation_id) {
                None => 0,
                Some(ids) => match markers.get(&(*conversation_id, user_id)) {
                    None => ids.len() as u64,
                    Some(marker) => ids
                        .range((Bound::Excluded(*marker), Bound::Unbounded))
                        .count() as u64,
                },
            };
            counts.insert(*conversation_id, unread);
        }
        Ok(counts)
    }
}

#[async_trait]
impl read_marker::Data for MemoryDatabase {
    async fn marker_get(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<Option<MessageId>> {
        Ok(self
            .markers
            .read()
            .await
            .get(&(conversation_id, user_id))
            .copied())
    }

    async fn marker_advance(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<MessageId> {
        let mut markers = self.markers.write().await;
        let marker = markers
            .entry((conversation_id, user_id))
            .and_modify(|current| *current = (*current).max(message_id))
            .or_insert(message_id);
        Ok(*marker)
    }

    async fn seen_add(&self, message_id: MessageId, user_id: UserId) -> Result<bool> {
        let mut messages = self.messages.write().await;
        let message = messages
            .get_mut(&message_id)
            .ok_or_else(|| Error::NotFound(format!("message {message_id}")))?;
        if message.seen_by.contains(&user_id) {
            return Ok(false);
        }
        message.seen_by.push(user_id);
        Ok(true)
    }
}

#[async_trait]
impl notifications::Data for MemoryDatabase {
    async fn notification_create(&self, notification: &Notification) -> Result<()> {
        self.notifications
            .write()
            .await
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn notification_get(&self, id: NotificationId) -> Result<Option<Notification>> {
        Ok(self.notifications.read().await.get(&id).cloned())
    }

    async fn notifications_page(
        &self,
        recipient: UserId,
        page: u64,
        limit: u64,
        unread_only: bool,
    ) -> Result<(Vec<Notification>, u64)> {
        let page = page.max(1);
        let notifications = self.notifications.read().await;
        let mut matching: Vec<Notification> = notifications
            .values()
            .filter(|n| n.recipient == recipient && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip((page - 1).saturating_mul(limit) as usize)
            .take(limit as usize)
            .collect();
        Ok((items, total))
    }

    async fn notification_mark_read(&self, id: NotificationId) -> Result<()> {
        let mut notifications = self.notifications.write().await;
        let notification = notifications
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("notification {id}")))?;
        notification.is_read = true;
        Ok(())
    }
}
