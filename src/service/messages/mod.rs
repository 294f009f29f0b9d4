// =============================================================================
// Taskhive Planning Backend - Message Service
// =============================================================================
//
// Description:
//   One parameterized pipeline for task comments and group messages:
//   gatekeeper check, persist, advance the sender's own cursor, push
//   the message to the conversation room, then hand off to the fan-out
//   engine. Fan-out failures never fail the write that triggered them.
//
// =============================================================================

mod data;
pub use data::{Data, NewMessage};

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{instrument, warn};

use taskhive_common::{
    Conversation, ConversationId, ConversationKind, Error, Message, MessageId, Result, UserId,
};

use crate::service::conversations::{self, Access};
use crate::service::notifications::{self, Trigger};
use crate::service::presence::{self, RoomId, ServerEvent};
use crate::service::read_marker;

pub struct Service {
    pub db: Arc<dyn Data>,
    pub conversations: Arc<conversations::Service>,
    pub markers: Arc<read_marker::Service>,
    pub notifications: Arc<notifications::Service>,
    pub presence: Arc<presence::Service>,
}

impl Service {
    pub fn new(
        db: Arc<dyn Data>,
        conversations: Arc<conversations::Service>,
        markers: Arc<read_marker::Service>,
        notifications: Arc<notifications::Service>,
        presence: Arc<presence::Service>,
    ) -> Self {
        Self {
            db,
            conversations,
            markers,
            notifications,
            presence,
        }
    }

    /// Creates a comment/message in a conversation.
    ///
    /// The write commits once the store accepts it; cursor update,
    /// room push and notification fan-out run afterwards and cannot
    /// fail the creation.
    #[instrument(skip(self, content, mentions))]
    pub async fn create(
        &self,
        conversation_id: ConversationId,
        author_id: UserId,
        content: String,
        is_file: bool,
        mentions: Vec<UserId>,
        reply_to: Option<MessageId>,
    ) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(Error::InvalidArgument("message content is required".into()));
        }
        self.conversations
            .authorize(conversation_id, author_id, Access::Write)
            .await?;
        let conversation = self.conversations.get(conversation_id).await?;

        let mentions = dedupe(mentions);
        let message = self
            .db
            .message_create(NewMessage {
                conversation_id,
                author_id,
                content,
                is_file,
                mentions: mentions.clone(),
                reply_to,
                created_at: Utc::now(),
            })
            .await?;

        // The sender has obviously seen their own message. A failure
        // here only costs an overcounted unread badge for the sender.
        if let Err(e) = self
            .markers
            .advance(conversation_id, author_id, message.id)
            .await
        {
            warn!(%conversation_id, %author_id, "failed to advance sender cursor: {e}");
        }

        self.presence
            .emit_to_room(
                RoomId::Conversation(conversation_id),
                ServerEvent::NewMessage {
                    conversation_id,
                    message: message.clone(),
                },
            )
            .await;

        self.fan_out_for_create(&conversation, &message).await;
        Ok(message)
    }

    async fn fan_out_for_create(&self, conversation: &Conversation, message: &Message) {
        match &conversation.kind {
            ConversationKind::Task { author, assignee } => {
                self.notifications
                    .notify(Trigger::Comment {
                        conversation: conversation.id,
                        title: conversation.title.clone(),
                        sender: message.author_id,
                        author: *author,
                        assignee: *assignee,
                    })
                    .await;
            }
            ConversationKind::Group { .. } => {
                if !message.mentions.is_empty() {
                    self.notifications
                        .notify(Trigger::MentionsAdded {
                            conversation: conversation.id,
                            sender: message.author_id,
                            added: message.mentions.clone(),
                        })
                        .await;
                }
            }
        }
    }

    /// Edits a message. Author-only, active conversations only. Only
    /// mentions that are new in this edit trigger notifications; users
    /// already mentioned before stay quiet.
    #[instrument(skip(self, content, mentions))]
    pub async fn update(
        &self,
        message_id: MessageId,
        actor: UserId,
        content: String,
        mentions: Vec<UserId>,
    ) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(Error::InvalidArgument("message content is required".into()));
        }
        let mut message = self
            .db
            .message_get(message_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {message_id}")))?;
        self.conversations
            .authorize(message.conversation_id, actor, Access::Write)
            .await?;
        if message.author_id != actor {
            return Err(Error::Forbidden("not the message author".into()));
        }
        let conversation = self.conversations.get(message.conversation_id).await?;

        let mentions = dedupe(mentions);
        let previous: BTreeSet<UserId> = message.mentions.iter().copied().collect();
        let added: Vec<UserId> = mentions
            .iter()
            .copied()
            .filter(|user| !previous.contains(user))
            .collect();

        self.db
            .message_update(message_id, &content, &mentions)
            .await?;
        message.content = content;
        message.mentions = mentions;

        if matches!(conversation.kind, ConversationKind::Group { .. }) && !added.is_empty() {
            self.notifications
                .notify(Trigger::MentionsAdded {
                    conversation: conversation.id,
                    sender: actor,
                    added,
                })
                .await;
        }
        Ok(message)
    }

    /// Lists a page of messages, oldest-first within the page, newest
    /// page first (reverse pagination). Listing doubles as an implicit
    /// read acknowledgment: the reader's cursor advances to the newest
    /// id in the returned page. Max-merge keeps reads of older pages
    /// from regressing the cursor.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
        page: u64,
        limit: u64,
    ) -> Result<Vec<Message>> {
        self.conversations
            .authorize(conversation_id, reader, Access::Read)
            .await?;
        let messages = self.db.messages_page(conversation_id, page, limit).await?;
        if let Some(newest) = messages.last() {
            self.markers
                .advance(conversation_id, reader, newest.id)
                .await?;
        }
        Ok(messages)
    }

    /// Explicit read acknowledgment of a specific message.
    pub async fn acknowledge(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
        message_id: MessageId,
    ) -> Result<MessageId> {
        self.conversations
            .authorize(conversation_id, reader, Access::Read)
            .await?;
        let message = self
            .db
            .message_get(message_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {message_id}")))?;
        if message.conversation_id != conversation_id {
            return Err(Error::InvalidArgument(
                "message does not belong to this conversation".into(),
            ));
        }
        self.markers.advance(conversation_id, reader, message_id).await
    }

    /// Per-message receipt for group threads. Task threads track reads
    /// through the cursor alone and never keep a seen set.
    pub async fn mark_seen(&self, message_id: MessageId, user_id: UserId) -> Result<bool> {
        let message = self
            .db
            .message_get(message_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {message_id}")))?;
        self.conversations
            .authorize(message.conversation_id, user_id, Access::Read)
            .await?;
        let conversation = self.conversations.get(message.conversation_id).await?;
        if !matches!(conversation.kind, ConversationKind::Group { .. }) {
            return Err(Error::InvalidArgument(
                "receipts are only kept on group threads".into(),
            ));
        }
        self.markers.mark_seen(message_id, user_id).await
    }
}

fn dedupe(users: Vec<UserId>) -> Vec<UserId> {
    let mut seen = BTreeSet::new();
    users.into_iter().filter(|u| seen.insert(*u)).collect()
}
