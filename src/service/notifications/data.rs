use async_trait::async_trait;

use taskhive_common::{Notification, NotificationId, Result, UserId};

/// Storage contract for notification records.
#[async_trait]
pub trait Data: Send + Sync {
    async fn notification_create(&self, notification: &Notification) -> Result<()>;

    async fn notification_get(&self, id: NotificationId) -> Result<Option<Notification>>;

    /// Newest-first page for a recipient, plus the total matching
    /// count for list metadata.
    async fn notifications_page(
        &self,
        recipient: UserId,
        page: u64,
        limit: u64,
        unread_only: bool,
    ) -> Result<(Vec<Notification>, u64)>;

    /// Flips `is_read`; idempotent on an already-read record.
    async fn notification_mark_read(&self, id: NotificationId) -> Result<()>;
}
