use std::sync::Arc;

use chrono::{Duration, Utc};
use courier_blob::{BlobStore, StorageKeyGenerator, UploadOptions};
use courier_contract::{
    generate_transfer_code, NewNotification, NewTransfer, Progress, ProvisionalTransfer, Session,
    Transfer, TransferError, TransferEvent, TransferRequest, TransferStatus,
};
use courier_storage::RecordStore;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::outcome::{Compensation, SideEffect, TransferOutcome};

const EVENT_CAPACITY: usize = 256;
const UPLOADED_PROGRESS: u8 = 50;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub issue_codes: bool,
    pub ttl: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            issue_codes: true,
            ttl: None,
        }
    }
}

/// Uploads bytes, persists the transfer record, undoes the upload when the
/// record cannot be written, and notifies the recipient.
#[derive(Clone)]
pub struct TransferOrchestrator {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn RecordStore>,
    keys: Arc<StorageKeyGenerator>,
    config: OrchestratorConfig,
    events: broadcast::Sender<TransferEvent>,
}

impl TransferOrchestrator {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn RecordStore>,
        config: OrchestratorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            blobs,
            records,
            keys: StorageKeyGenerator::shared(),
            config,
            events,
        }
    }

    /// Replaces the process-wide key generator.
    pub fn with_key_generator(mut self, keys: Arc<StorageKeyGenerator>) -> Self {
        self.keys = keys;
        self
    }

    /// Completed/failed observations for every call made through this
    /// orchestrator.
    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.events.subscribe()
    }

    pub async fn initiate_transfer(
        &self,
        session: Option<&Session>,
        request: TransferRequest,
    ) -> TransferOutcome {
        let mut provisional = ProvisionalTransfer::begin(&request);

        let Some(session) = session.filter(|session| session.is_authenticated()) else {
            return self.fail(provisional, TransferError::Unauthenticated, None);
        };

        if request.recipient_email.trim().is_empty() {
            return self.fail(
                provisional,
                TransferError::Unknown("recipient email is required".to_string()),
                None,
            );
        }

        if let Err(err) = self.blobs.ensure_ready().await {
            warn!(store = %self.blobs.name(), error = %err, "blob store readiness check failed");
        }

        provisional.transition(TransferStatus::Uploading);
        let key = self.keys.key_for(&session.user_id, &request.file_name);
        info!(
            local_id = %provisional.local_id,
            key = %key,
            size = request.bytes.len(),
            "uploading transfer payload"
        );

        if let Err(err) = self
            .blobs
            .upload(&key, request.bytes.clone(), UploadOptions::no_overwrite())
            .await
        {
            error!(key = %key, error = %err, "upload failed");
            return self.fail(provisional, TransferError::UploadFailed(err.to_string()), None);
        }

        provisional.report_progress(UPLOADED_PROGRESS);
        provisional.transition(TransferStatus::Transferring);
        let file_url = match self.blobs.public_url(&key).await {
            Ok(url) if !url.trim().is_empty() => url,
            Ok(_) => {
                let compensation = self.compensate(key);
                return self.fail(
                    provisional,
                    TransferError::Unknown("blob store returned an empty public URL".to_string()),
                    Some(compensation),
                );
            }
            Err(err) => {
                error!(key = %key, error = %err, "public URL lookup failed");
                let compensation = self.compensate(key);
                return self.fail(
                    provisional,
                    TransferError::Unknown(format!("failed to resolve public URL: {err}")),
                    Some(compensation),
                );
            }
        };

        if request.parsed_file_type().is_none() {
            debug!(file_type = %request.file_type, "declared file type is not a MIME type");
        }

        let now = Utc::now();
        let expires_at = match self.config.ttl {
            None => None,
            Some(ttl) => match now.checked_add_signed(ttl) {
                Some(at) => Some(at),
                None => {
                    error!(key = %key, "transfer expiry overflows the calendar");
                    let compensation = self.compensate(key);
                    return self.fail(
                        provisional,
                        TransferError::Unknown("transfer expiry is out of range".to_string()),
                        Some(compensation),
                    );
                }
            },
        };

        let row = NewTransfer {
            sender_id: session.user_id.clone(),
            recipient_email: request.recipient_email.clone(),
            file_name: request.file_name.clone(),
            file_size: request.file_size,
            file_type: request.file_type.clone(),
            file_url,
            status: TransferStatus::Completed,
            progress: Progress::COMPLETE,
            completed_at: Some(now),
            transfer_code: self.config.issue_codes.then(generate_transfer_code),
            expires_at,
        };

        let transfer = match self.records.insert_transfer(row).await {
            Ok(transfer) => transfer,
            Err(err) => {
                error!(key = %key, error = %format!("{err:#}"), "transfer record insert failed");
                let compensation = self.compensate(key);
                return self.fail(
                    provisional,
                    TransferError::RecordFailed(format!("{err:#}")),
                    Some(compensation),
                );
            }
        };

        provisional.transition(TransferStatus::Completed);
        info!(transfer_id = %transfer.id, key = %key, "transfer persisted");

        let notification = self.notify(&transfer, session).await;
        let _ = self.events.send(TransferEvent::Completed {
            transfer: transfer.clone(),
        });

        TransferOutcome {
            provisional,
            result: Ok(transfer),
            notification,
            compensation: None,
        }
    }

    async fn notify(&self, transfer: &Transfer, session: &Session) -> SideEffect {
        let fallback = session.profile();
        let row = NewNotification::for_transfer(transfer, fallback.display_name());
        match self.records.insert_notification(row).await {
            Ok(notification) => {
                info!(
                    transfer_id = %transfer.id,
                    notification_id = %notification.id,
                    "recipient notified"
                );
                SideEffect::Succeeded
            }
            Err(err) => {
                warn!(transfer_id = %transfer.id, error = %format!("{err:#}"), "failed to create notification");
                SideEffect::Failed(format!("{err:#}"))
            }
        }
    }

    /// Deletes the uploaded object in the background.
    fn compensate(&self, key: String) -> Compensation {
        let blobs = self.blobs.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            match blobs.delete(&task_key).await {
                Ok(()) => {
                    info!(key = %task_key, "compensating delete completed");
                    SideEffect::Succeeded
                }
                Err(err) => {
                    error!(key = %task_key, error = %err, "compensating delete failed");
                    SideEffect::Failed(err.to_string())
                }
            }
        });
        Compensation::new(key, handle)
    }

    fn fail(
        &self,
        mut provisional: ProvisionalTransfer,
        error: TransferError,
        compensation: Option<Compensation>,
    ) -> TransferOutcome {
        provisional.transition(TransferStatus::Failed);
        warn!(
            local_id = %provisional.local_id,
            kind = error.kind(),
            error = %error,
            "transfer failed"
        );
        let _ = self.events.send(TransferEvent::Failed {
            provisional_id: provisional.local_id.clone(),
            file_name: provisional.file_name.clone(),
            recipient_email: provisional.recipient_email.clone(),
            error: error.to_string(),
        });

        TransferOutcome {
            provisional,
            result: Err(error),
            notification: SideEffect::NotAttempted,
            compensation,
        }
    }
}
