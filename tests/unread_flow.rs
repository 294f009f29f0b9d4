//! End-to-end read-tracking scenarios over the in-memory store: read
//! cursors advance implicitly on listing, unread counts derive lazily
//! from the cursor, and archived conversations reject writes.

use std::sync::Arc;

use taskhive::database::MemoryDatabase;
use taskhive::{Error, Services};
use taskhive_common::UserId;

fn services() -> Services {
    Services::build(Arc::new(MemoryDatabase::new()))
}

#[tokio::test]
async fn test_unread_count_follows_cursor() {
    let services = services();
    let author = UserId::new();
    let assignee = UserId::new();

    let task = services
        .conversations
        .create_task_thread("paint the fence", author, assignee)
        .await
        .unwrap();

    for i in 0..3 {
        services
            .messages
            .create(task.id, author, format!("coat {i}"), false, vec![], None)
            .await
            .unwrap();
    }

    // The author saw their own comments; the assignee saw nothing yet.
    assert_eq!(services.unread.count(task.id, author).await.unwrap(), 0);
    assert_eq!(services.unread.count(task.id, assignee).await.unwrap(), 3);

    // Listing is an implicit acknowledgment of the returned page.
    let page = services.messages.list(task.id, assignee, 1, 50).await.unwrap();
    assert_eq!(page.len(), 3);
    assert_eq!(services.unread.count(task.id, assignee).await.unwrap(), 0);

    // A fourth comment makes exactly one message unread again.
    services
        .messages
        .create(task.id, author, "final coat".into(), false, vec![], None)
        .await
        .unwrap();
    assert_eq!(services.unread.count(task.id, assignee).await.unwrap(), 1);
}

#[tokio::test]
async fn test_huge_page_number_clamps_to_start() {
    let services = services();
    let author = UserId::new();
    let assignee = UserId::new();

    let task = services
        .conversations
        .create_task_thread("backlog", author, assignee)
        .await
        .unwrap();
    for i in 0..3 {
        services
            .messages
            .create(task.id, author, format!("m{i}"), false, vec![], None)
            .await
            .unwrap();
    }

    // Page numbers come straight from the query string; the window
    // arithmetic must clamp instead of overflowing.
    let page = services
        .messages
        .list(task.id, author, u64::MAX, 50)
        .await
        .unwrap();
    assert_eq!(page.len(), 3);
}

#[tokio::test]
async fn test_cursor_never_regresses() {
    let services = services();
    let author = UserId::new();
    let assignee = UserId::new();

    let task = services
        .conversations
        .create_task_thread("triage", author, assignee)
        .await
        .unwrap();

    let mut ids = Vec::new();
    for i in 0..3 {
        let message = services
            .messages
            .create(task.id, author, format!("m{i}"), false, vec![], None)
            .await
            .unwrap();
        ids.push(message.id);
    }

    let newest = *ids.last().unwrap();
    let oldest = ids[0];

    assert_eq!(
        services.messages.acknowledge(task.id, assignee, newest).await.unwrap(),
        newest
    );
    // Acknowledging an older message afterwards is a silent no-op.
    assert_eq!(
        services.messages.acknowledge(task.id, assignee, oldest).await.unwrap(),
        newest
    );
    assert_eq!(
        services.markers.marker(task.id, assignee).await.unwrap(),
        Some(newest)
    );
    assert_eq!(services.unread.count(task.id, assignee).await.unwrap(), 0);
}

#[tokio::test]
async fn test_acknowledge_rejects_foreign_message() {
    let services = services();
    let author = UserId::new();
    let assignee = UserId::new();

    let first = services
        .conversations
        .create_task_thread("one", author, assignee)
        .await
        .unwrap();
    let second = services
        .conversations
        .create_task_thread("two", author, assignee)
        .await
        .unwrap();

    let message = services
        .messages
        .create(first.id, author, "hello".into(), false, vec![], None)
        .await
        .unwrap();

    let err = services
        .messages
        .acknowledge(second.id, assignee, message.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn test_batched_summary_covers_all_conversations() {
    let services = services();
    let user = UserId::new();
    let peer = UserId::new();

    let task = services
        .conversations
        .create_task_thread("roadmap", peer, user)
        .await
        .unwrap();
    let group = services
        .conversations
        .create_group("ops", peer, vec![user])
        .await
        .unwrap();

    services
        .messages
        .create(task.id, peer, "ping".into(), false, vec![], None)
        .await
        .unwrap();
    for _ in 0..2 {
        services
            .messages
            .create(group.id, peer, "hum".into(), false, vec![], None)
            .await
            .unwrap();
    }

    let mut summary = services.unread.count_for_user(user).await.unwrap();
    summary.sort_by_key(|entry| entry.unread);
    assert_eq!(summary.len(), 2);
    assert_eq!(summary[0].conversation_id, task.id);
    assert_eq!(summary[0].unread, 1);
    assert_eq!(summary[1].conversation_id, group.id);
    assert_eq!(summary[1].unread, 2);

    // The peer authored everything, so their summary is all zeros.
    let summary = services.unread.count_for_user(peer).await.unwrap();
    assert!(summary.iter().all(|entry| entry.unread == 0));
}

#[tokio::test]
async fn test_archived_conversation_rejects_writes_for_everyone() {
    let services = services();
    let author = UserId::new();
    let assignee = UserId::new();

    let task = services
        .conversations
        .create_task_thread("wrap up", author, assignee)
        .await
        .unwrap();
    services
        .messages
        .create(task.id, assignee, "done?".into(), false, vec![], None)
        .await
        .unwrap();

    services.conversations.archive(task.id, assignee).await.unwrap();

    for user in [author, assignee] {
        let err = services
            .messages
            .create(task.id, user, "too late".into(), false, vec![], None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    // Reads still work: listing, counting and acknowledging.
    let page = services.messages.list(task.id, author, 1, 50).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(services.unread.count(task.id, author).await.unwrap(), 0);
}

#[tokio::test]
async fn test_outsiders_are_rejected() {
    let services = services();
    let author = UserId::new();
    let assignee = UserId::new();
    let stranger = UserId::new();

    let task = services
        .conversations
        .create_task_thread("private", author, assignee)
        .await
        .unwrap();

    let err = services
        .messages
        .list(task.id, stranger, 1, 50)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    let err = services
        .messages
        .create(task.id, stranger, "hi".into(), false, vec![], None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
}

#[tokio::test]
async fn test_task_threads_keep_no_seen_receipts() {
    let services = services();
    let author = UserId::new();
    let assignee = UserId::new();

    let task = services
        .conversations
        .create_task_thread("cursor only", author, assignee)
        .await
        .unwrap();
    let message = services
        .messages
        .create(task.id, author, "ping".into(), false, vec![], None)
        .await
        .unwrap();

    let err = services
        .messages
        .mark_seen(message.id, assignee)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    // The cursor path still works for task threads.
    services
        .messages
        .acknowledge(task.id, assignee, message.id)
        .await
        .unwrap();
    assert_eq!(services.unread.count(task.id, assignee).await.unwrap(), 0);
}

#[tokio::test]
async fn test_group_seen_receipts_are_a_set() {
    let services = services();
    let creator = UserId::new();
    let member = UserId::new();

    let group = services
        .conversations
        .create_group("standup", creator, vec![member])
        .await
        .unwrap();
    let message = services
        .messages
        .create(group.id, creator, "morning".into(), false, vec![], None)
        .await
        .unwrap();
    assert!(message.seen_by.is_empty());

    assert!(services.messages.mark_seen(message.id, member).await.unwrap());
    // Second receipt from the same user changes nothing.
    assert!(!services.messages.mark_seen(message.id, member).await.unwrap());

    let page = services.messages.list(group.id, creator, 1, 50).await.unwrap();
    assert_eq!(page[0].seen_by, vec![member]);
}
