//! Notification fan-out scenarios: which writes notify whom, how the
//! realtime push pairs with the persisted record, and what an offline
//! recipient can still recover afterwards.

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use taskhive::database::MemoryDatabase;
use taskhive::service::notifications::Trigger;
use taskhive::service::presence::ServerEvent;
use taskhive::{Error, Services};
use taskhive_common::{NotificationKind, UserId};

fn services() -> Services {
    Services::build(Arc::new(MemoryDatabase::new()))
}

/// Simulates an identified realtime session for `user`.
async fn attach(services: &Services, user: UserId) -> mpsc::UnboundedReceiver<ServerEvent> {
    let conn = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    services.presence.connect(conn, tx).await;
    services.presence.identify(conn, user).await.unwrap();
    rx
}

#[tokio::test]
async fn test_task_comment_notifies_the_other_party() {
    let services = services();
    let author = UserId::new();
    let assignee = UserId::new();

    let task = services
        .conversations
        .create_task_thread("deploy", author, assignee)
        .await
        .unwrap();

    // Task creation itself already notified the assignee.
    let (records, total) = services.notifications.list(assignee, 1, 50, false).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(records[0].kind, NotificationKind::TaskAssigned);

    services
        .messages
        .create(task.id, assignee, "on it".into(), false, vec![], None)
        .await
        .unwrap();

    // The comment went the other way, to the author, and never back to
    // the sender.
    let (records, _) = services.notifications.list(author, 1, 50, false).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, NotificationKind::Comment);
    assert_eq!(records[0].sender, assignee);

    let (records, total) = services.notifications.list(assignee, 1, 50, false).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_self_assigned_task_notifies_nobody() {
    let services = services();
    let solo = UserId::new();

    services
        .conversations
        .create_task_thread("me time", solo, solo)
        .await
        .unwrap();

    let (_, total) = services.notifications.list(solo, 1, 50, false).await.unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_group_creation_notifies_members_minus_creator() {
    let services = services();
    let creator = UserId::new();
    let u2 = UserId::new();
    let u3 = UserId::new();

    services
        .conversations
        .create_group("launch", creator, vec![u2, u3])
        .await
        .unwrap();

    for member in [u2, u3] {
        let (records, total) = services.notifications.list(member, 1, 50, false).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(records[0].kind, NotificationKind::GroupInvite);
        assert_eq!(records[0].sender, creator);
    }
    let (_, total) = services.notifications.list(creator, 1, 50, false).await.unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_edit_notifies_only_newly_mentioned() {
    let services = services();
    let sender = UserId::new();
    let alice = UserId::new();
    let bob = UserId::new();

    let group = services
        .conversations
        .create_group("docs", sender, vec![alice, bob])
        .await
        .unwrap();

    let message = services
        .messages
        .create(group.id, sender, "draft ready".into(), false, vec![alice], None)
        .await
        .unwrap();

    // Creation mentioned alice once.
    let (records, _) = services.notifications.list(alice, 1, 50, false).await.unwrap();
    let mentions = records
        .iter()
        .filter(|n| n.kind == NotificationKind::Mention)
        .count();
    assert_eq!(mentions, 1);

    // The edit adds bob while keeping alice: only bob is new.
    services
        .messages
        .update(message.id, sender, "draft ready, please review".into(), vec![alice, bob])
        .await
        .unwrap();

    let (records, _) = services.notifications.list(alice, 1, 50, false).await.unwrap();
    let mentions = records
        .iter()
        .filter(|n| n.kind == NotificationKind::Mention)
        .count();
    assert_eq!(mentions, 1, "alice must not be re-notified");

    let (records, _) = services.notifications.list(bob, 1, 50, false).await.unwrap();
    let mentions: Vec<_> = records
        .iter()
        .filter(|n| n.kind == NotificationKind::Mention)
        .collect();
    assert_eq!(mentions.len(), 1);
    assert_eq!(mentions[0].sender, sender);
}

#[tokio::test]
async fn test_live_push_reaches_identified_connection() {
    let services = services();
    let author = UserId::new();
    let assignee = UserId::new();

    let mut inbox = attach(&services, assignee).await;

    services
        .conversations
        .create_task_thread("hotfix", author, assignee)
        .await
        .unwrap();

    let Some(ServerEvent::Notification { notification }) = inbox.recv().await else {
        panic!("expected a pushed notification");
    };
    assert_eq!(notification.recipient, assignee);
    assert_eq!(notification.kind, NotificationKind::TaskAssigned);
    assert!(!notification.is_read);
}

#[tokio::test]
async fn test_offline_recipient_recovers_via_list() {
    let services = services();
    let author = UserId::new();
    let assignee = UserId::new();

    // Nobody connected: the push is dropped but the record persists.
    let task = services
        .conversations
        .create_task_thread("quiet work", author, assignee)
        .await
        .unwrap();
    services
        .messages
        .create(task.id, author, "update".into(), false, vec![], None)
        .await
        .unwrap();

    // Reconnecting replays nothing over the socket.
    let mut inbox = attach(&services, assignee).await;
    assert!(inbox.try_recv().is_err());

    // The notification list still has both records, newest first.
    let (records, total) = services.notifications.list(assignee, 1, 50, false).await.unwrap();
    assert_eq!(total, 2);
    assert_eq!(records[0].kind, NotificationKind::Comment);
    assert_eq!(records[1].kind, NotificationKind::TaskAssigned);
}

#[tokio::test]
async fn test_mark_read_is_recipient_only_and_idempotent() {
    let services = services();
    let author = UserId::new();
    let assignee = UserId::new();

    services
        .conversations
        .create_task_thread("review", author, assignee)
        .await
        .unwrap();
    let (records, _) = services.notifications.list(assignee, 1, 50, false).await.unwrap();
    let id = records[0].id;

    let err = services.notifications.mark_read(id, author).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    services.notifications.mark_read(id, assignee).await.unwrap();
    services.notifications.mark_read(id, assignee).await.unwrap();

    let (unread, total) = services.notifications.list(assignee, 1, 50, true).await.unwrap();
    assert_eq!(total, 0);
    assert!(unread.is_empty());
}

#[tokio::test]
async fn test_note_share_fires_on_first_share_only() {
    let services = services();
    let owner = UserId::new();
    let reader = UserId::new();
    let note = Uuid::new_v4();

    services
        .notifications
        .notify(Trigger::NoteShared {
            note,
            owner,
            previous: vec![],
            shared_with: vec![reader],
        })
        .await;
    services
        .notifications
        .notify(Trigger::NoteShared {
            note,
            owner,
            previous: vec![reader],
            shared_with: vec![reader, UserId::new()],
        })
        .await;

    let (records, total) = services.notifications.list(reader, 1, 50, false).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(records[0].kind, NotificationKind::NoteShared);
}
