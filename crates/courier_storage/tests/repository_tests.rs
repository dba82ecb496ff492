//! Integration tests for the SQLite record store.

use chrono::Utc;
use courier_contract::{NewNotification, NewTransfer, Progress, SenderProfile, TransferStatus};
use courier_storage::{RecordStore, SqliteRecordStore, StorageConfig};
use tempfile::TempDir;

async fn open_store() -> (SqliteRecordStore, TempDir) {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("courier.db");
    let store = SqliteRecordStore::connect(&StorageConfig {
        sqlite_path: path.display().to_string(),
    })
    .await
    .expect("connect");
    (store, temp)
}

fn completed(sender_id: &str, recipient: &str, file_name: &str) -> NewTransfer {
    NewTransfer {
        sender_id: sender_id.to_string(),
        recipient_email: recipient.to_string(),
        file_name: file_name.to_string(),
        file_size: 2048,
        file_type: "application/pdf".to_string(),
        file_url: format!("http://localhost/blobs/{sender_id}/1_{file_name}"),
        status: TransferStatus::Completed,
        progress: Progress::COMPLETE,
        completed_at: Some(Utc::now()),
        transfer_code: Some("AB12CD34".to_string()),
        expires_at: None,
    }
}

fn alice() -> SenderProfile {
    SenderProfile {
        id: "u1".to_string(),
        email: "alice@example.com".to_string(),
        name: Some("Alice".to_string()),
    }
}

#[tokio::test]
async fn insert_reads_back_joined_sender() {
    let (store, _temp) = open_store().await;
    store.upsert_profile(&alice()).await.expect("profile");

    let transfer = store
        .insert_transfer(completed("u1", "bob@example.com", "report.pdf"))
        .await
        .expect("insert");

    assert!(!transfer.id.is_empty());
    assert_eq!(transfer.status, TransferStatus::Completed);
    assert_eq!(transfer.file_size, 2048);
    assert_eq!(transfer.transfer_code.as_deref(), Some("AB12CD34"));
    assert_eq!(transfer.sender, Some(alice()));

    let fetched = store
        .get_transfer(&transfer.id)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(fetched, transfer);
}

#[tokio::test]
async fn missing_profile_leaves_sender_empty() {
    let (store, _temp) = open_store().await;
    let transfer = store
        .insert_transfer(completed("ghost", "bob@example.com", "a.txt"))
        .await
        .expect("insert");
    assert!(transfer.sender.is_none());
}

#[tokio::test]
async fn unknown_transfer_is_none() {
    let (store, _temp) = open_store().await;
    assert!(store.get_transfer("nope").await.expect("query").is_none());
}

#[tokio::test]
async fn listings_are_newest_first_and_filtered() {
    let (store, _temp) = open_store().await;
    store.upsert_profile(&alice()).await.expect("profile");

    let mut inserted = Vec::new();
    for name in ["one.txt", "two.txt", "three.txt"] {
        inserted.push(
            store
                .insert_transfer(completed("u1", "bob@example.com", name))
                .await
                .expect("insert"),
        );
    }
    store
        .insert_transfer(completed("u2", "carol@example.com", "other.txt"))
        .await
        .expect("insert");

    let sent = store.list_transfers_by_sender("u1").await.expect("sent");
    let names: Vec<&str> = sent.iter().map(|t| t.file_name.as_str()).collect();
    assert_eq!(names, ["three.txt", "two.txt", "one.txt"]);
    assert!(sent.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    let received = store
        .list_transfers_by_recipient("bob@example.com")
        .await
        .expect("received");
    assert_eq!(received.len(), 3);
    assert_eq!(received[0].id, inserted[2].id);

    let none = store
        .list_transfers_by_recipient("BOB@example.com")
        .await
        .expect("received");
    assert!(none.is_empty(), "recipient match is exact");
}

#[tokio::test]
async fn unread_notifications_join_transfer_and_mark_read_is_idempotent() {
    let (store, _temp) = open_store().await;
    store.upsert_profile(&alice()).await.expect("profile");
    let transfer = store
        .insert_transfer(completed("u1", "bob@example.com", "report.pdf"))
        .await
        .expect("insert");

    let first = store
        .insert_notification(NewNotification::for_transfer(&transfer, "alice@example.com"))
        .await
        .expect("notify");
    let second = store
        .insert_notification(NewNotification::for_transfer(&transfer, "alice@example.com"))
        .await
        .expect("notify");
    assert!(!first.is_read);

    let unread = store
        .list_unread_notifications("bob@example.com")
        .await
        .expect("unread");
    assert_eq!(unread.len(), 2);
    assert_eq!(unread[0].notification.id, second.id);
    assert_eq!(unread[0].transfer.id, transfer.id);
    assert_eq!(
        unread[0].transfer.sender.as_ref().map(|s| s.email.as_str()),
        Some("alice@example.com")
    );
    assert_eq!(
        unread[0].notification.message,
        "You received a file: report.pdf from Alice"
    );

    assert!(store.mark_notification_read(&first.id).await.expect("mark"));
    assert!(!store.mark_notification_read(&first.id).await.expect("mark again"));
    assert!(!store.mark_notification_read("missing").await.expect("unknown id"));

    let unread = store
        .list_unread_notifications("bob@example.com")
        .await
        .expect("unread");
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].notification.id, second.id);
}

#[tokio::test]
async fn notification_for_unknown_transfer_is_rejected() {
    let (store, _temp) = open_store().await;
    let result = store
        .insert_notification(NewNotification {
            transfer_id: "does-not-exist".to_string(),
            recipient_email: "bob@example.com".to_string(),
            message: "hello".to_string(),
        })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn in_memory_database_is_usable() {
    let store = SqliteRecordStore::connect(&StorageConfig {
        sqlite_path: ":memory:".to_string(),
    })
    .await
    .expect("connect");
    store.ping().await.expect("ping");
    store
        .insert_transfer(completed("u1", "bob@example.com", "a.txt"))
        .await
        .expect("insert");
    assert_eq!(store.list_transfers_by_sender("u1").await.expect("sent").len(), 1);
}
