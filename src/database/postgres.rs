// =============================================================================
// Taskhive Planning Backend - PostgreSQL Store
// =============================================================================
//
// Description:
//   Production backend on sqlx. Message ids come from a Postgres
//   sequence (strictly increasing store-wide, therefore within every
//   conversation). Cursor merges and seen-by set adds are pushed into
//   SQL so concurrent writers resolve inside the database, not in
//   application memory. Pool/IO timeouts surface as Transient, which
//   callers may retry.
//
// =============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{info, instrument};
use uuid::Uuid;

use taskhive_common::{
    Conversation, ConversationId, ConversationKind, ConversationStatus, Error, Member, Message,
    MessageId, Notification, NotificationId, NotificationKind, Result, UserId,
};

use crate::config::DatabaseConfig;
use crate::service::messages::NewMessage;
use crate::service::{conversations, messages, notifications, read_marker};

const SCHEMA: &[&str] = &[
    "CREATE SEQUENCE IF NOT EXISTS message_seq",
    "CREATE TABLE IF NOT EXISTS conversations (
        id UUID PRIMARY KEY,
        title TEXT NOT NULL,
        kind TEXT NOT NULL,
        author_id UUID,
        assignee_id UUID,
        members TEXT,
        participants UUID[] NOT NULL,
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id BIGINT PRIMARY KEY DEFAULT nextval('message_seq'),
        conversation_id UUID NOT NULL,
        author_id UUID NOT NULL,
        content TEXT NOT NULL,
        is_file BOOLEAN NOT NULL DEFAULT FALSE,
        mentions UUID[] NOT NULL DEFAULT '{}',
        seen_by UUID[] NOT NULL DEFAULT '{}',
        reply_to BIGINT,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS messages_conversation_idx
        ON messages (conversation_id, id)",
    "CREATE TABLE IF NOT EXISTS read_markers (
        conversation_id UUID NOT NULL,
        user_id UUID NOT NULL,
        last_seen_id BIGINT NOT NULL,
        PRIMARY KEY (conversation_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS notifications (
        id UUID PRIMARY KEY,
        recipient UUID NOT NULL,
        sender UUID NOT NULL,
        kind TEXT NOT NULL,
        body TEXT NOT NULL,
        doc_id UUID,
        is_read BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS notifications_recipient_idx
        ON notifications (recipient, created_at DESC)",
];

pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    #[instrument(skip(config), fields(max_connections = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(db_err)?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await.map_err(db_err)?;
        }
        info!("postgres store ready");
        Ok(Self { pool })
    }
}

fn db_err(e: sqlx::Error) -> Error {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => Error::Transient(e.to_string()),
        other => Error::Database(other.to_string()),
    }
}

fn kind_to_str(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::TaskAssigned => "task-assigned",
        NotificationKind::Comment => "comment",
        NotificationKind::Mention => "mention",
        NotificationKind::GroupInvite => "group-invite",
        NotificationKind::NoteShared => "note-shared",
        NotificationKind::Generic => "generic",
    }
}

fn kind_from_str(raw: &str) -> Result<NotificationKind> {
    Ok(match raw {
        "task-assigned" => NotificationKind::TaskAssigned,
        "comment" => NotificationKind::Comment,
        "mention" => NotificationKind::Mention,
        "group-invite" => NotificationKind::GroupInvite,
        "note-shared" => NotificationKind::NoteShared,
        "generic" => NotificationKind::Generic,
        other => return Err(Error::bad_database(&format!("unknown notification kind {other}"))),
    })
}

fn conversation_from_row(row: &PgRow) -> Result<Conversation> {
    let kind_tag: String = row.try_get("kind").map_err(db_err)?;
    let kind = match kind_tag.as_str() {
        "task" => ConversationKind::Task {
            author: UserId(row.try_get("author_id").map_err(db_err)?),
            assignee: UserId(row.try_get("assignee_id").map_err(db_err)?),
        },
        "group" => {
            let raw: String = row.try_get("members").map_err(db_err)?;
            let members: Vec<Member> = serde_json::from_str(&raw)
                .map_err(|_| Error::bad_database("invalid member list json"))?;
            ConversationKind::Group { members }
        }
        other => return Err(Error::bad_database(&format!("unknown conversation kind {other}"))),
    };
    let status = match row.try_get::<String, _>("status").map_err(db_err)?.as_str() {
        "active" => ConversationStatus::Active,
        "archived" => ConversationStatus::Archived,
        other => return Err(Error::bad_database(&format!("unknown status {other}"))),
    };
    Ok(Conversation {
        id: ConversationId(row.try_get("id").map_err(db_err)?),
        title: row.try_get("title").map_err(db_err)?,
        kind,
        status,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn message_from_row(row: &PgRow) -> Result<Message> {
    let mentions: Vec<Uuid> = row.try_get("mentions").map_err(db_err)?;
    let seen_by: Vec<Uuid> = row.try_get("seen_by").map_err(db_err)?;
    Ok(Message {
        id: MessageId(row.try_get::<i64, _>("id").map_err(db_err)? as u64),
        conversation_id: ConversationId(row.try_get("conversation_id").map_err(db_err)?),
        author_id: UserId(row.try_get("author_id").map_err(db_err)?),
        content: row.try_get("content").map_err(db_err)?,
        is_file: row.try_get("is_file").map_err(db_err)?,
        mentions: mentions.into_iter().map(UserId).collect(),
        seen_by: seen_by.into_iter().map(UserId).collect(),
        reply_to: row
            .try_get::<Option<i64>, _>("reply_to")
            .map_err(db_err)?
            .map(|id| MessageId(id as u64)),
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification> {
    let kind: String = row.try_get("kind").map_err(db_err)?;
    Ok(Notification {
        id: NotificationId(row.try_get("id").map_err(db_err)?),
        recipient: UserId(row.try_get("recipient").map_err(db_err)?),
        sender: UserId(row.try_get("sender").map_err(db_err)?),
        kind: kind_from_str(&kind)?,
        body: row.try_get("body").map_err(db_err)?,
        doc_id: row.try_get("doc_id").map_err(db_err)?,
        is_read: row.try_get("is_read").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

#[async_trait]
impl conversations::Data for PgDatabase {
    async fn conversation_create(&self, conversation: &Conversation) -> Result<()> {
        let participants: Vec<Uuid> =
            conversation.participants().into_iter().map(|u| u.0).collect();
        let (kind, author, assignee, members) = match &conversation.kind {
            ConversationKind::Task { author, assignee } => {
                ("task", Some(author.0), Some(assignee.0), None)
            }
            ConversationKind::Group { members } => {
                ("group", None, None, Some(serde_json::to_string(members)?))
            }
        };
        let status = match conversation.status {
            ConversationStatus::Active => "active",
            ConversationStatus::Archived => "archived",
        };
        sqlx::query(
            "INSERT INTO conversations
                (id, title, kind, author_id, assignee_id, members, participants, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(conversation.id.0)
        .bind(&conversation.title)
        .bind(kind)
        .bind(author)
        .bind(assignee)
        .bind(members)
        .bind(&participants)
        .bind(status)
        .bind(conversation.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn conversation_get(&self, id: ConversationId) -> Result<Option<Conversation>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(conversation_from_row).transpose()
    }

    async fn conversation_set_status(
        &self,
        id: ConversationId,
        status: ConversationStatus,
    ) -> Result<()> {
        let status = match status {
            ConversationStatus::Active => "active",
            ConversationStatus::Archived => "archived",
        };
        let result = sqlx::query("UPDATE conversations SET status = $2 WHERE id = $1")
            .bind(id.0)
            .bind(status)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("conversation {id}")));
        }
        Ok(())
    }

    async fn conversation_set_members(
        &self,
        id: ConversationId,
        members: &[Member],
    ) -> Result<()> {
        let participants: Vec<Uuid> = members.iter().map(|m| m.user_id.0).collect();
        let result = sqlx::query(
            "UPDATE conversations SET members = $2, participants = $3
             WHERE id = $1 AND kind = 'group'",
        )
        .bind(id.0)
        .bind(serde_json::to_string(members)?)
        .bind(&participants)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("group conversation {id}")));
        }
        Ok(())
    }

    async fn conversations_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT * FROM conversations WHERE $1 = ANY(participants) ORDER BY created_at",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(conversation_from_row).collect()
    }
}

#[async_trait]
impl messages::Data for PgDatabase {
    async fn message_create(&self, new: NewMessage) -> Result<Message> {
        let mentions: Vec<Uuid> = new.mentions.iter().map(|u| u.0).collect();
        let row = sqlx::query(
            "INSERT INTO messages
                (conversation_id, author_id, content, is_file, mentions, reply_to, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(new.conversation_id.0)
        .bind(new.author_id.0)
        .bind(&new.content)
        .bind(new.is_file)
        .bind(&mentions)
        .bind(new.reply_to.map(|id| id.0 as i64))
        .bind(new.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        message_from_row(&row)
    }

    async fn message_get(&self, id: MessageId) -> Result<Option<Message>> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = $1")
            .bind(id.0 as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn message_update(
        &self,
        id: MessageId,
        content: &str,
        mentions: &[UserId],
    ) -> Result<()> {
        let mentions: Vec<Uuid> = mentions.iter().map(|u| u.0).collect();
        let result =
            sqlx::query("UPDATE messages SET content = $2, mentions = $3 WHERE id = $1")
                .bind(id.0 as i64)
                .bind(content)
                .bind(&mentions)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("message {id}")));
        }
        Ok(())
    }

    async fn messages_page(
        &self,
        conversation_id: ConversationId,
        page: u64,
        limit: u64,
    ) -> Result<Vec<Message>> {
        let page = page.max(1);
        let total: i64 =
            sqlx::query("SELECT COUNT(*) AS n FROM messages WHERE conversation_id = $1")
                .bind(conversation_id.0)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?
                .try_get("n")
                .map_err(db_err)?;
        let skip = (total as u64).saturating_sub(page.saturating_mul(limit));
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = $1
             ORDER BY id ASC OFFSET $2 LIMIT $3",
        )
        .bind(conversation_id.0)
        .bind(skip as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(message_from_row).collect()
    }

    async fn count_after(
        &self,
        conversation_id: ConversationId,
        after: Option<MessageId>,
    ) -> Result<u64> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM messages
             WHERE conversation_id = $1 AND id > $2",
        )
        .bind(conversation_id.0)
        .bind(after.map(|id| id.0 as i64).unwrap_or(0))
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?
        .try_get("n")
        .map_err(db_err)?;
        Ok(count as u64)
    }

    async fn latest_message_id(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<MessageId>> {
        let row = sqlx::query(
            "SELECT MAX(id) AS latest FROM messages WHERE conversation_id = $1",
        )
        .bind(conversation_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        let latest: Option<i64> = row.try_get("latest").map_err(db_err)?;
        Ok(latest.map(|id| MessageId(id as u64)))
    }

    async fn unread_counts(
        &self,
        user_id: UserId,
        conversations: &[ConversationId],
    ) -> Result<BTreeMap<ConversationId, u64>> {
        let ids: Vec<Uuid> = conversations.iter().map(|c| c.0).collect();
        let rows = sqlx::query(
            "SELECT m.conversation_id AS conversation_id, COUNT(*) AS unread
             FROM messages m
             LEFT JOIN read_markers r
                ON r.conversation_id = m.conversation_id AND r.user_id = $2
             WHERE m.conversation_id = ANY($1)
               AND (r.last_seen_id IS NULL OR m.id > r.last_seen_id)
             GROUP BY m.conversation_id",
        )
        .bind(&ids)
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let conversation = ConversationId(row.try_get("conversation_id").map_err(db_err)?);
            let unread: i64 = row.try_get("unread").map_err(db_err)?;
            counts.insert(conversation, unread as u64);
        }
        Ok(counts)
    }
}

#[async_trait]
impl read_marker::Data for PgDatabase {
    async fn marker_get(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<Option<MessageId>> {
        let row = sqlx::query(
            "SELECT last_seen_id FROM read_markers
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id.0)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(match row {
            Some(row) => Some(MessageId(
                row.try_get::<i64, _>("last_seen_id").map_err(db_err)? as u64,
            )),
            None => None,
        })
    }

    async fn marker_advance(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<MessageId> {
        // GREATEST merge in SQL: two acks racing each other settle on
        // the higher id no matter the arrival order.
        let row = sqlx::query(
            "INSERT INTO read_markers (conversation_id, user_id, last_seen_id)
             VALUES ($1, $2, $3)
             ON CONFLICT (conversation_id, user_id)
             DO UPDATE SET last_seen_id =
                GREATEST(read_markers.last_seen_id, EXCLUDED.last_seen_id)
             RETURNING last_seen_id",
        )
        .bind(conversation_id.0)
        .bind(user_id.0)
        .bind(message_id.0 as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(MessageId(
            row.try_get::<i64, _>("last_seen_id").map_err(db_err)? as u64,
        ))
    }

    async fn seen_add(&self, message_id: MessageId, user_id: UserId) -> Result<bool> {
        // Conditional append keeps set semantics under concurrency.
        let result = sqlx::query(
            "UPDATE messages SET seen_by = array_append(seen_by, $2)
             WHERE id = $1 AND NOT ($2 = ANY(seen_by))",
        )
        .bind(message_id.0 as i64)
        .bind(user_id.0)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        let exists = sqlx::query("SELECT 1 AS one FROM messages WHERE id = $1")
            .bind(message_id.0 as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("message {message_id}")));
        }
        Ok(false)
    }
}

#[async_trait]
impl notifications::Data for PgDatabase {
    async fn notification_create(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            "INSERT INTO notifications
                (id, recipient, sender, kind, body, doc_id, is_read, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(notification.id.0)
        .bind(notification.recipient.0)
        .bind(notification.sender.0)
        .bind(kind_to_str(notification.kind))
        .bind(&notification.body)
        .bind(notification.doc_id)
        .bind(notification.is_read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn notification_get(&self, id: NotificationId) -> Result<Option<Notification>> {
        let row = sqlx::query("SELECT * FROM notifications WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(notification_from_row).transpose()
    }

    async fn notifications_page(
        &self,
        recipient: UserId,
        page: u64,
        limit: u64,
        unread_only: bool,
    ) -> Result<(Vec<Notification>, u64)> {
        let page = page.max(1);
        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM notifications
             WHERE recipient = $1 AND ($2 = FALSE OR is_read = FALSE)",
        )
        .bind(recipient.0)
        .bind(unread_only)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?
        .try_get("n")
        .map_err(db_err)?;
        let rows = sqlx::query(
            "SELECT * FROM notifications
             WHERE recipient = $1 AND ($2 = FALSE OR is_read = FALSE)
             ORDER BY created_at DESC OFFSET $3 LIMIT $4",
        )
        .bind(recipient.0)
        .bind(unread_only)
        .bind((page - 1).saturating_mul(limit).min(i64::MAX as u64) as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let items = rows
            .iter()
            .map(notification_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok((items, total as u64))
    }

    async fn notification_mark_read(&self, id: NotificationId) -> Result<()> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("notification {id}")));
        }
        Ok(())
    }
}
