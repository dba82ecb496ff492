use anyhow::Result;
use async_trait::async_trait;
use courier_contract::{
    NewNotification, NewTransfer, Notification, NotificationWithTransfer, SenderProfile, Transfer,
};

/// Durable store for transfers, notifications and the profile directory.
///
/// Every read of a transfer embeds its sender profile when one exists.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn upsert_profile(&self, profile: &SenderProfile) -> Result<()>;

    /// Inserts the row and reads it back joined with the sender profile in
    /// the same exchange.
    async fn insert_transfer(&self, transfer: NewTransfer) -> Result<Transfer>;

    async fn get_transfer(&self, transfer_id: &str) -> Result<Option<Transfer>>;

    /// Newest first.
    async fn list_transfers_by_sender(&self, sender_id: &str) -> Result<Vec<Transfer>>;

    /// Newest first, exact email match.
    async fn list_transfers_by_recipient(&self, recipient_email: &str) -> Result<Vec<Transfer>>;

    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification>;

    /// Unread only, newest first.
    async fn list_unread_notifications(
        &self,
        recipient_email: &str,
    ) -> Result<Vec<NotificationWithTransfer>>;

    /// Returns whether the row changed; an already-read or unknown id is a no-op.
    async fn mark_notification_read(&self, notification_id: &str) -> Result<bool>;
}
