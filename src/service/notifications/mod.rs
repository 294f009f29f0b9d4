// =============================================================================
// Taskhive Planning Backend - Notification Fan-out Engine
// =============================================================================
//
// Description:
//   Turns triggering writes (comment, mention edit, group creation,
//   task assignment, note share) into persisted Notification records
//   and best-effort realtime pushes. Fan-out is a side channel: it
//   never propagates failure to the caller of the triggering write,
//   and one recipient failing never aborts the others.
//
// =============================================================================

mod data;
pub use data::Data;

use std::sync::Arc;

use tracing::{instrument, warn};
use uuid::Uuid;

use taskhive_common::{
    ConversationId, Error, Notification, NotificationId, NotificationKind, Result, UserId,
};

use crate::service::presence::{self, RoomId, ServerEvent};

/// A triggering write, carrying everything recipient resolution needs.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// A task was created with an assignee.
    TaskAssigned {
        task: ConversationId,
        title: String,
        author: UserId,
        assignee: UserId,
    },
    /// A comment landed on a two-party task thread.
    Comment {
        conversation: ConversationId,
        title: String,
        sender: UserId,
        author: UserId,
        assignee: UserId,
    },
    /// A group message gained mentions; `added` must already be the
    /// diff against the previous mention set (see messages::update).
    MentionsAdded {
        conversation: ConversationId,
        sender: UserId,
        added: Vec<UserId>,
    },
    /// A group chat was created with initial members.
    GroupCreated {
        group: ConversationId,
        name: String,
        creator: UserId,
        members: Vec<UserId>,
    },
    /// A user was added to an existing group.
    MemberAdded {
        group: ConversationId,
        name: String,
        actor: UserId,
        user: UserId,
    },
    /// A user was removed from a group.
    MemberRemoved {
        group: ConversationId,
        name: String,
        actor: UserId,
        user: UserId,
    },
    /// A note's share list changed.
    NoteShared {
        note: Uuid,
        owner: UserId,
        previous: Vec<UserId>,
        shared_with: Vec<UserId>,
    },
}

pub struct Service {
    pub db: Arc<dyn Data>,
    pub presence: Arc<presence::Service>,
}

impl Service {
    pub fn new(db: Arc<dyn Data>, presence: Arc<presence::Service>) -> Self {
        Self { db, presence }
    }

    /// Resolves recipients, persists one record per recipient, and
    /// pushes each persisted record to the recipient's user room.
    ///
    /// Never returns an error: the triggering action must commit even
    /// if fan-out fails entirely. Failures are logged per recipient; a
    /// notification whose write failed is never pushed.
    #[instrument(skip(self, trigger))]
    pub async fn notify(&self, trigger: Trigger) {
        for notification in Self::resolve(&trigger) {
            if let Err(e) = self.db.notification_create(&notification).await {
                warn!(
                    recipient = %notification.recipient,
                    kind = ?notification.kind,
                    "failed to persist notification: {e}"
                );
                continue;
            }
            // Best-effort: with no live connection the record still
            // exists for later polling.
            self.presence
                .emit_to_room(
                    RoomId::User(notification.recipient),
                    ServerEvent::Notification {
                        notification: notification.clone(),
                    },
                )
                .await;
        }
    }

    /// Recipient resolution rules, one arm per event type.
    fn resolve(trigger: &Trigger) -> Vec<Notification> {
        match trigger {
            Trigger::TaskAssigned {
                task,
                title,
                author,
                assignee,
            } => {
                if assignee == author {
                    return Vec::new();
                }
                vec![Notification::new(
                    *assignee,
                    *author,
                    NotificationKind::TaskAssigned,
                    format!("You were assigned the task \"{title}\""),
                    Some(task.0),
                )]
            }
            Trigger::Comment {
                conversation,
                title,
                sender,
                author,
                assignee,
            } => {
                let recipient = if sender == author { *assignee } else { *author };
                // Two-party invariant should make this impossible.
                if recipient == *sender {
                    return Vec::new();
                }
                vec![Notification::new(
                    recipient,
                    *sender,
                    NotificationKind::Comment,
                    format!("New comment on \"{title}\""),
                    Some(conversation.0),
                )]
            }
            Trigger::MentionsAdded {
                conversation,
                sender,
                added,
            } => added
                .iter()
                .filter(|user| *user != sender)
                .map(|user| {
                    Notification::new(
                        *user,
                        *sender,
                        NotificationKind::Mention,
                        "You were mentioned in a group chat".to_string(),
                        Some(conversation.0),
                    )
                })
                .collect(),
            Trigger::GroupCreated {
                group,
                name,
                creator,
                members,
            } => members
                .iter()
                .filter(|user| *user != creator)
                .map(|user| {
                    Notification::new(
                        *user,
                        *creator,
                        NotificationKind::GroupInvite,
                        format!("You were added to the group \"{name}\""),
                        Some(group.0),
                    )
                })
                .collect(),
            Trigger::MemberAdded {
                group,
                name,
                actor,
                user,
            } => {
                if user == actor {
                    return Vec::new();
                }
                vec![Notification::new(
                    *user,
                    *actor,
                    NotificationKind::GroupInvite,
                    format!("You were added to the group \"{name}\""),
                    Some(group.0),
                )]
            }
            Trigger::MemberRemoved {
                group,
                name,
                actor,
                user,
            } => {
                if user == actor {
                    return Vec::new();
                }
                vec![Notification::new(
                    *user,
                    *actor,
                    NotificationKind::Generic,
                    format!("You were removed from the group \"{name}\""),
                    Some(group.0),
                )]
            }
            Trigger::NoteShared {
                note,
                owner,
                previous,
                shared_with,
            } => {
                // Only the transition from unshared to shared fires,
                // so repeated share-list edits do not spam recipients.
                if !previous.is_empty() || shared_with.is_empty() {
                    return Vec::new();
                }
                shared_with
                    .iter()
                    .filter(|user| *user != owner)
                    .map(|user| {
                        Notification::new(
                            *user,
                            *owner,
                            NotificationKind::NoteShared,
                            "A note was shared with you".to_string(),
                            Some(*note),
                        )
                    })
                    .collect()
            }
        }
    }

    /// Newest-first notification list for the recipient.
    pub async fn list(
        &self,
        recipient: UserId,
        page: u64,
        limit: u64,
        unread_only: bool,
    ) -> Result<(Vec<Notification>, u64)> {
        self.db
            .notifications_page(recipient, page, limit, unread_only)
            .await
    }

    /// Marks a notification read. Only the owning recipient may flip
    /// the flag; repeated calls are no-ops.
    pub async fn mark_read(&self, id: NotificationId, actor: UserId) -> Result<()> {
        let notification = self
            .db
            .notification_get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("notification {id}")))?;
        if notification.recipient != actor {
            return Err(Error::Forbidden("not the notification recipient".into()));
        }
        if notification.is_read {
            return Ok(());
        }
        self.db.notification_mark_read(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(notifications: &[Notification]) -> Vec<(UserId, NotificationKind)> {
        notifications.iter().map(|n| (n.recipient, n.kind)).collect()
    }

    #[test]
    fn test_task_assigned_skips_self_assignment() {
        let author = UserId::new();
        let assignee = UserId::new();
        let task = ConversationId::new();

        let hits = Service::resolve(&Trigger::TaskAssigned {
            task,
            title: "ship it".into(),
            author,
            assignee,
        });
        assert_eq!(kinds(&hits), vec![(assignee, NotificationKind::TaskAssigned)]);

        let none = Service::resolve(&Trigger::TaskAssigned {
            task,
            title: "solo".into(),
            author,
            assignee: author,
        });
        assert!(none.is_empty());
    }

    #[test]
    fn test_comment_targets_other_party() {
        let author = UserId::new();
        let assignee = UserId::new();
        let conversation = ConversationId::new();

        let from_author = Service::resolve(&Trigger::Comment {
            conversation,
            title: "t".into(),
            sender: author,
            author,
            assignee,
        });
        assert_eq!(kinds(&from_author), vec![(assignee, NotificationKind::Comment)]);

        let from_assignee = Service::resolve(&Trigger::Comment {
            conversation,
            title: "t".into(),
            sender: assignee,
            author,
            assignee,
        });
        assert_eq!(kinds(&from_assignee), vec![(author, NotificationKind::Comment)]);
    }

    #[test]
    fn test_comment_never_notifies_sender() {
        let user = UserId::new();
        let hits = Service::resolve(&Trigger::Comment {
            conversation: ConversationId::new(),
            title: "degenerate".into(),
            sender: user,
            author: user,
            assignee: user,
        });
        assert!(hits.is_empty());
    }

    #[test]
    fn test_mentions_exclude_sender() {
        let sender = UserId::new();
        let other = UserId::new();
        let hits = Service::resolve(&Trigger::MentionsAdded {
            conversation: ConversationId::new(),
            sender,
            added: vec![sender, other],
        });
        assert_eq!(kinds(&hits), vec![(other, NotificationKind::Mention)]);
    }

    #[test]
    fn test_group_created_notifies_members_minus_creator() {
        let creator = UserId::new();
        let u2 = UserId::new();
        let u3 = UserId::new();
        let hits = Service::resolve(&Trigger::GroupCreated {
            group: ConversationId::new(),
            name: "ops".into(),
            creator,
            members: vec![creator, u2, u3],
        });
        assert_eq!(
            kinds(&hits),
            vec![
                (u2, NotificationKind::GroupInvite),
                (u3, NotificationKind::GroupInvite)
            ]
        );
    }

    #[test]
    fn test_membership_changes_notify_the_subject_only() {
        let admin = UserId::new();
        let user = UserId::new();
        let group = ConversationId::new();

        let added = Service::resolve(&Trigger::MemberAdded {
            group,
            name: "ops".into(),
            actor: admin,
            user,
        });
        assert_eq!(kinds(&added), vec![(user, NotificationKind::GroupInvite)]);

        let removed = Service::resolve(&Trigger::MemberRemoved {
            group,
            name: "ops".into(),
            actor: admin,
            user,
        });
        assert_eq!(kinds(&removed), vec![(user, NotificationKind::Generic)]);

        // An admin acting on themselves notifies nobody.
        let own = Service::resolve(&Trigger::MemberRemoved {
            group,
            name: "ops".into(),
            actor: admin,
            user: admin,
        });
        assert!(own.is_empty());
    }

    #[test]
    fn test_note_shared_first_share_only() {
        let owner = UserId::new();
        let reader = UserId::new();
        let note = Uuid::new_v4();

        let first = Service::resolve(&Trigger::NoteShared {
            note,
            owner,
            previous: vec![],
            shared_with: vec![reader],
        });
        assert_eq!(kinds(&first), vec![(reader, NotificationKind::NoteShared)]);

        let later = Service::resolve(&Trigger::NoteShared {
            note,
            owner,
            previous: vec![reader],
            shared_with: vec![reader, UserId::new()],
        });
        assert!(later.is_empty());
    }
}
