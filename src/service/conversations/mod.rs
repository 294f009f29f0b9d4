// =============================================================================
// Taskhive Planning Backend - Conversation Gatekeeper
// =============================================================================
//
// Description:
//   Conversation lifecycle plus the authorization guard invoked before
//   every message read or write. The guard is pure: it checks
//   existence, participation and archive state, and has no side
//   effects.
//
// =============================================================================

mod data;
pub use data::Data;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use taskhive_common::{
    Conversation, ConversationId, ConversationKind, ConversationStatus, Error, Member, Result,
    Role, UserId,
};

use crate::service::notifications::{self, Trigger};

/// What the caller intends to do with the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

pub struct Service {
    pub db: Arc<dyn Data>,
    pub notifications: Arc<notifications::Service>,
}

impl Service {
    pub fn new(db: Arc<dyn Data>, notifications: Arc<notifications::Service>) -> Self {
        Self { db, notifications }
    }

    /// Fails with `NotFound` for a missing conversation, `Forbidden`
    /// for a non-participant, and `Forbidden` for writes to an
    /// archived conversation. Returns nothing on success.
    #[instrument(skip(self))]
    pub async fn authorize(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        access: Access,
    ) -> Result<()> {
        let conversation = self.get(conversation_id).await?;
        if !conversation.is_participant(user_id) {
            return Err(Error::Forbidden("not a participant".into()));
        }
        if access == Access::Write && conversation.is_archived() {
            return Err(Error::Forbidden("conversation is closed".into()));
        }
        Ok(())
    }

    pub async fn get(&self, conversation_id: ConversationId) -> Result<Conversation> {
        self.db
            .conversation_get(conversation_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))
    }

    /// Creates the two-party comment thread for a task and fires the
    /// task-assigned fan-out (a self-assigned task notifies nobody).
    pub async fn create_task_thread(
        &self,
        title: &str,
        author: UserId,
        assignee: UserId,
    ) -> Result<Conversation> {
        if title.trim().is_empty() {
            return Err(Error::InvalidArgument("task title is required".into()));
        }
        let conversation = Conversation {
            id: ConversationId::new(),
            title: title.trim().to_owned(),
            kind: ConversationKind::Task { author, assignee },
            status: ConversationStatus::Active,
            created_at: Utc::now(),
        };
        self.db.conversation_create(&conversation).await?;

        self.notifications
            .notify(Trigger::TaskAssigned {
                task: conversation.id,
                title: title.to_owned(),
                author,
                assignee,
            })
            .await;
        Ok(conversation)
    }

    /// Creates a group chat. The creator becomes the admin member;
    /// invited users join as plain members. Initial members minus the
    /// creator each get a group-invite notification.
    pub async fn create_group(
        &self,
        name: &str,
        creator: UserId,
        invited: Vec<UserId>,
    ) -> Result<Conversation> {
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument("group name is required".into()));
        }

        let mut seen = BTreeSet::new();
        let mut members = vec![Member {
            user_id: creator,
            role: Role::Admin,
        }];
        seen.insert(creator);
        for user_id in invited {
            if seen.insert(user_id) {
                members.push(Member {
                    user_id,
                    role: Role::Member,
                });
            }
        }

        let conversation = Conversation {
            id: ConversationId::new(),
            title: name.trim().to_owned(),
            kind: ConversationKind::Group {
                members: members.clone(),
            },
            status: ConversationStatus::Active,
            created_at: Utc::now(),
        };
        self.db.conversation_create(&conversation).await?;

        self.notifications
            .notify(Trigger::GroupCreated {
                group: conversation.id,
                name: name.to_owned(),
                creator,
                members: members.iter().map(|m| m.user_id).collect(),
            })
            .await;
        Ok(conversation)
    }

    /// Adds a user to a group with `Role::Member`. Group admins only;
    /// the new member gets a group-invite notification.
    #[instrument(skip(self))]
    pub async fn add_member(
        &self,
        conversation_id: ConversationId,
        actor: UserId,
        user_id: UserId,
    ) -> Result<Conversation> {
        let conversation = self.get(conversation_id).await?;
        let mut members = admin_gate(&conversation, actor)?;
        if members.iter().any(|m| m.user_id == user_id) {
            return Err(Error::Conflict("already a member".into()));
        }
        members.push(Member {
            user_id,
            role: Role::Member,
        });
        self.db
            .conversation_set_members(conversation_id, &members)
            .await?;

        self.notifications
            .notify(Trigger::MemberAdded {
                group: conversation_id,
                name: conversation.title.clone(),
                actor,
                user: user_id,
            })
            .await;
        self.get(conversation_id).await
    }

    /// Removes a member from a group. Group admins only; removing the
    /// last admin is rejected so the group never ends up unmanaged.
    #[instrument(skip(self))]
    pub async fn remove_member(
        &self,
        conversation_id: ConversationId,
        actor: UserId,
        user_id: UserId,
    ) -> Result<Conversation> {
        let conversation = self.get(conversation_id).await?;
        let mut members = admin_gate(&conversation, actor)?;
        let Some(position) = members.iter().position(|m| m.user_id == user_id) else {
            return Err(Error::NotFound(format!("member {user_id}")));
        };
        let admins = members.iter().filter(|m| m.role == Role::Admin).count();
        if members[position].role == Role::Admin && admins == 1 {
            return Err(Error::Forbidden("cannot remove the last admin".into()));
        }
        members.remove(position);
        self.db
            .conversation_set_members(conversation_id, &members)
            .await?;

        self.notifications
            .notify(Trigger::MemberRemoved {
                group: conversation_id,
                name: conversation.title.clone(),
                actor,
                user: user_id,
            })
            .await;
        self.get(conversation_id).await
    }

    /// Changes a member's role. Group admins only; demoting the last
    /// admin is rejected.
    #[instrument(skip(self))]
    pub async fn set_role(
        &self,
        conversation_id: ConversationId,
        actor: UserId,
        user_id: UserId,
        role: Role,
    ) -> Result<Conversation> {
        let conversation = self.get(conversation_id).await?;
        let mut members = admin_gate(&conversation, actor)?;
        let admins = members.iter().filter(|m| m.role == Role::Admin).count();
        let Some(member) = members.iter_mut().find(|m| m.user_id == user_id) else {
            return Err(Error::NotFound(format!("member {user_id}")));
        };
        if member.role == Role::Admin && role == Role::Member && admins == 1 {
            return Err(Error::Forbidden("cannot demote the last admin".into()));
        }
        member.role = role;
        self.db
            .conversation_set_members(conversation_id, &members)
            .await?;
        self.get(conversation_id).await
    }

    /// Archives a conversation, after which writes are rejected.
    /// Task threads: either participant. Groups: admin members only.
    #[instrument(skip(self))]
    pub async fn archive(&self, conversation_id: ConversationId, actor: UserId) -> Result<()> {
        let conversation = self.get(conversation_id).await?;
        let allowed = match &conversation.kind {
            ConversationKind::Task { .. } => conversation.is_participant(actor),
            ConversationKind::Group { members } => members
                .iter()
                .any(|m| m.user_id == actor && m.role == Role::Admin),
        };
        if !allowed {
            return Err(Error::Forbidden("not allowed to archive".into()));
        }
        self.db
            .conversation_set_status(conversation_id, ConversationStatus::Archived)
            .await
    }

    pub async fn for_user(&self, user_id: UserId) -> Result<Vec<Conversation>> {
        self.db.conversations_for_user(user_id).await
    }
}

/// Shared gate for membership edits: groups only, active only, admin
/// members only. Returns the current member list for mutation.
fn admin_gate(conversation: &Conversation, actor: UserId) -> Result<Vec<Member>> {
    let ConversationKind::Group { members } = &conversation.kind else {
        return Err(Error::InvalidArgument(
            "task threads have a fixed participant pair".into(),
        ));
    };
    if conversation.is_archived() {
        return Err(Error::Forbidden("conversation is closed".into()));
    }
    if !members
        .iter()
        .any(|m| m.user_id == actor && m.role == Role::Admin)
    {
        return Err(Error::Forbidden("not a group admin".into()));
    }
    Ok(members.clone())
}
