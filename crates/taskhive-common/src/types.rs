//! Domain model shared across the backend.
//!
//! Ids are newtypes: entity ids wrap a `Uuid`, message ids wrap the
//! store-assigned `u64` sequence number. Message ids are comparable,
//! and within one conversation they are strictly increasing, so they
//! double as the read-cursor ordering.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| Error::InvalidArgument(format!("malformed id: {s}")))
            }
        }
    };
}

uuid_id!(UserId);
uuid_id!(ConversationId);
uuid_id!(NotificationId);

/// Store-assigned message sequence number.
///
/// Strictly increasing within a conversation; `id(a) < id(b)` means
/// `a` was persisted before `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

/// One entry in a group conversation's member list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: UserId,
    pub role: Role,
}

/// Participant structure of a conversation.
///
/// Task threads are fixed two-party (author and assignee); group
/// threads carry a dynamic member list with roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ConversationKind {
    Task { author: UserId, assignee: UserId },
    Group { members: Vec<Member> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    /// Task name or group name, used in notification texts.
    pub title: String,
    #[serde(flatten)]
    pub kind: ConversationKind,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_archived(&self) -> bool {
        self.status == ConversationStatus::Archived
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        match &self.kind {
            ConversationKind::Task { author, assignee } => {
                *author == user_id || *assignee == user_id
            }
            // Any role counts; role only matters for group admin
            // operations, not for read/write access.
            ConversationKind::Group { members } => {
                members.iter().any(|m| m.user_id == user_id)
            }
        }
    }

    pub fn participants(&self) -> Vec<UserId> {
        match &self.kind {
            ConversationKind::Task { author, assignee } => vec![*author, *assignee],
            ConversationKind::Group { members } => {
                members.iter().map(|m| m.user_id).collect()
            }
        }
    }
}

/// A comment on a task thread or a message in a group chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub author_id: UserId,
    pub content: String,
    #[serde(default)]
    pub is_file: bool,
    /// Users called out in the message body.
    #[serde(default)]
    pub mentions: Vec<UserId>,
    /// Per-message read receipts, only maintained for group threads.
    #[serde(default)]
    pub seen_by: Vec<UserId>,
    #[serde(default)]
    pub reply_to: Option<MessageId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    TaskAssigned,
    Comment,
    Mention,
    GroupInvite,
    NoteShared,
    Generic,
}

/// A persisted notification, owned by its recipient.
///
/// Created by the fan-out engine; the only mutation ever applied is
/// flipping `is_read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: UserId,
    pub sender: UserId,
    pub kind: NotificationKind,
    pub body: String,
    /// The task, group or note the notification points at.
    pub doc_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient: UserId,
        sender: UserId,
        kind: NotificationKind,
        body: impl Into<String>,
        doc_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            recipient,
            sender,
            kind,
            body: body.into(),
            doc_id,
            is_read: false,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_conversation(author: UserId, assignee: UserId) -> Conversation {
        Conversation {
            id: ConversationId::new(),
            title: "release checklist".to_string(),
            kind: ConversationKind::Task { author, assignee },
            status: ConversationStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_message_id_ordering() {
        assert!(MessageId(1) < MessageId(2));
        assert_eq!(MessageId(7).max(MessageId(3)), MessageId(7));
    }

    #[test]
    fn test_task_participants() {
        let author = UserId::new();
        let assignee = UserId::new();
        let conversation = task_conversation(author, assignee);

        assert!(conversation.is_participant(author));
        assert!(conversation.is_participant(assignee));
        assert!(!conversation.is_participant(UserId::new()));
        assert_eq!(conversation.participants(), vec![author, assignee]);
    }

    #[test]
    fn test_group_membership_ignores_role() {
        let admin = UserId::new();
        let member = UserId::new();
        let conversation = Conversation {
            id: ConversationId::new(),
            title: "ops".to_string(),
            kind: ConversationKind::Group {
                members: vec![
                    Member { user_id: admin, role: Role::Admin },
                    Member { user_id: member, role: Role::Member },
                ],
            },
            status: ConversationStatus::Active,
            created_at: Utc::now(),
        };

        assert!(conversation.is_participant(admin));
        assert!(conversation.is_participant(member));
        assert!(!conversation.is_participant(UserId::new()));
    }

    #[test]
    fn test_id_parsing() {
        let id = ConversationId::new();
        let parsed: ConversationId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);

        let err = "not-a-uuid".parse::<UserId>().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_notification_kind_wire_names() {
        let json = serde_json::to_string(&NotificationKind::TaskAssigned).unwrap();
        assert_eq!(json, "\"task-assigned\"");
        let json = serde_json::to_string(&NotificationKind::NoteShared).unwrap();
        assert_eq!(json, "\"note-shared\"");
    }
}
