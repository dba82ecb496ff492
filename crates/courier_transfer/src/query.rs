use std::sync::Arc;

use courier_contract::{DownloadError, NotificationWithTransfer, Session, Transfer};
use courier_storage::RecordStore;
use tracing::{debug, error, warn};

/// Read side for history views. Store failures degrade to empty results.
#[derive(Clone)]
pub struct TransferQueryService {
    records: Arc<dyn RecordStore>,
}

impl TransferQueryService {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    pub async fn get_sent_transfers(&self, session: &Session) -> Vec<Transfer> {
        if !session.is_authenticated() {
            warn!("sent transfers requested without a principal");
            return Vec::new();
        }
        match self.records.list_transfers_by_sender(&session.user_id).await {
            Ok(transfers) => {
                debug!(user_id = %session.user_id, count = transfers.len(), "sent transfers fetched");
                transfers
            }
            Err(err) => {
                error!(user_id = %session.user_id, error = %format!("{err:#}"), "failed to fetch sent transfers");
                Vec::new()
            }
        }
    }

    pub async fn get_received_transfers(&self, recipient_email: &str) -> Vec<Transfer> {
        match self
            .records
            .list_transfers_by_recipient(recipient_email)
            .await
        {
            Ok(transfers) => {
                debug!(recipient = %recipient_email, count = transfers.len(), "received transfers fetched");
                transfers
            }
            Err(err) => {
                error!(recipient = %recipient_email, error = %format!("{err:#}"), "failed to fetch received transfers");
                Vec::new()
            }
        }
    }

    pub async fn get_unread_notifications(
        &self,
        recipient_email: &str,
    ) -> Vec<NotificationWithTransfer> {
        self.records
            .list_unread_notifications(recipient_email)
            .await
            .unwrap_or_else(|err| {
                error!(recipient = %recipient_email, error = %format!("{err:#}"), "failed to fetch notifications");
                Vec::new()
            })
    }

    /// Best-effort. Returns whether the notification flipped to read.
    pub async fn mark_notification_read(&self, notification_id: &str) -> bool {
        match self.records.mark_notification_read(notification_id).await {
            Ok(changed) => changed,
            Err(err) => {
                warn!(notification_id = %notification_id, error = %format!("{err:#}"), "failed to mark notification read");
                false
            }
        }
    }

    pub async fn resolve_download_location(
        &self,
        transfer_id: &str,
    ) -> Result<String, DownloadError> {
        let transfer = match self.records.get_transfer(transfer_id).await {
            Ok(Some(transfer)) => transfer,
            Ok(None) => return Err(DownloadError::NotFound),
            Err(err) => {
                error!(transfer_id = %transfer_id, error = %format!("{err:#}"), "transfer lookup failed");
                return Err(DownloadError::Unavailable);
            }
        };

        if !transfer.has_location() {
            warn!(transfer_id = %transfer_id, "transfer has no stored file URL");
            return Err(DownloadError::Unavailable);
        }
        Ok(transfer.file_url)
    }
}
