//! Shared harness: SQLite in a temp dir, in-memory blobs, and switchable
//! faults on both stores.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use courier_blob::{BlobError, BlobStore, InMemoryBlobStore, UploadOptions};
use courier_contract::{
    NewNotification, NewTransfer, Notification, NotificationWithTransfer, SenderProfile, Session,
    Transfer, TransferRequest,
};
use courier_storage::{RecordStore, SqliteRecordStore, StorageConfig};
use courier_transfer::{OrchestratorConfig, TransferOrchestrator, TransferQueryService};
use tempfile::TempDir;

pub const PUBLIC_BASE: &str = "http://localhost:8080/blobs";

#[derive(Default)]
pub struct RecordFaults {
    pub insert_transfer: AtomicBool,
    pub insert_notification: AtomicBool,
    pub reads: AtomicBool,
    pub mark_read: AtomicBool,
}

pub struct FaultyRecords {
    pub inner: SqliteRecordStore,
    pub faults: RecordFaults,
}

fn tripped(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}

#[async_trait]
impl RecordStore for FaultyRecords {
    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    async fn upsert_profile(&self, profile: &SenderProfile) -> Result<()> {
        self.inner.upsert_profile(profile).await
    }

    async fn insert_transfer(&self, transfer: NewTransfer) -> Result<Transfer> {
        if tripped(&self.faults.insert_transfer) {
            bail!("injected insert failure");
        }
        self.inner.insert_transfer(transfer).await
    }

    async fn get_transfer(&self, transfer_id: &str) -> Result<Option<Transfer>> {
        if tripped(&self.faults.reads) {
            bail!("injected read failure");
        }
        self.inner.get_transfer(transfer_id).await
    }

    async fn list_transfers_by_sender(&self, sender_id: &str) -> Result<Vec<Transfer>> {
        if tripped(&self.faults.reads) {
            bail!("injected read failure");
        }
        self.inner.list_transfers_by_sender(sender_id).await
    }

    async fn list_transfers_by_recipient(&self, recipient_email: &str) -> Result<Vec<Transfer>> {
        if tripped(&self.faults.reads) {
            bail!("injected read failure");
        }
        self.inner.list_transfers_by_recipient(recipient_email).await
    }

    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification> {
        if tripped(&self.faults.insert_notification) {
            bail!("injected notification failure");
        }
        self.inner.insert_notification(notification).await
    }

    async fn list_unread_notifications(
        &self,
        recipient_email: &str,
    ) -> Result<Vec<NotificationWithTransfer>> {
        if tripped(&self.faults.reads) {
            bail!("injected read failure");
        }
        self.inner.list_unread_notifications(recipient_email).await
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<bool> {
        if tripped(&self.faults.mark_read) {
            bail!("injected update failure");
        }
        self.inner.mark_notification_read(notification_id).await
    }
}

#[derive(Default)]
pub struct BlobFaults {
    pub ensure_ready: AtomicBool,
    pub upload: AtomicBool,
    pub public_url: AtomicBool,
    pub delete: AtomicBool,
}

pub struct FaultyBlobs {
    pub inner: InMemoryBlobStore,
    pub faults: BlobFaults,
}

#[async_trait]
impl BlobStore for FaultyBlobs {
    fn name(&self) -> &str {
        "faulty-memory"
    }

    async fn ensure_ready(&self) -> Result<(), BlobError> {
        if tripped(&self.faults.ensure_ready) {
            return Err(BlobError::Unavailable("injected readiness failure".to_string()));
        }
        self.inner.ensure_ready().await
    }

    async fn upload(&self, key: &str, bytes: Bytes, options: UploadOptions) -> Result<(), BlobError> {
        if tripped(&self.faults.upload) {
            return Err(BlobError::Unavailable("injected upload failure".to_string()));
        }
        self.inner.upload(key, bytes, options).await
    }

    async fn public_url(&self, key: &str) -> Result<String, BlobError> {
        if tripped(&self.faults.public_url) {
            return Err(BlobError::Unavailable("injected url failure".to_string()));
        }
        self.inner.public_url(key).await
    }

    async fn fetch(&self, key: &str) -> Result<Bytes, BlobError> {
        self.inner.fetch(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        if tripped(&self.faults.delete) {
            return Err(BlobError::Unavailable("injected delete failure".to_string()));
        }
        self.inner.delete(key).await
    }
}

pub struct Harness {
    pub blobs: Arc<FaultyBlobs>,
    pub records: Arc<FaultyRecords>,
    pub orchestrator: TransferOrchestrator,
    pub queries: TransferQueryService,
    _temp: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(OrchestratorConfig::default()).await
    }

    pub async fn with_config(config: OrchestratorConfig) -> Self {
        let temp = tempfile::tempdir().expect("Failed to create temp directory");
        let inner = SqliteRecordStore::connect(&StorageConfig {
            sqlite_path: temp.path().join("courier.db").display().to_string(),
        })
        .await
        .expect("Failed to open record store");
        inner
            .upsert_profile(&alice().profile())
            .await
            .expect("Failed to seed profile");

        let records = Arc::new(FaultyRecords {
            inner,
            faults: RecordFaults::default(),
        });
        let blobs = Arc::new(FaultyBlobs {
            inner: InMemoryBlobStore::new(PUBLIC_BASE),
            faults: BlobFaults::default(),
        });

        let orchestrator = TransferOrchestrator::new(blobs.clone(), records.clone(), config);
        let queries = TransferQueryService::new(records.clone());

        Self {
            blobs,
            records,
            orchestrator,
            queries,
            _temp: temp,
        }
    }

    pub async fn transfer_rows(&self) -> i64 {
        sqlx_count(&self.records.inner, "file_transfers").await
    }

    pub async fn notification_rows(&self) -> i64 {
        sqlx_count(&self.records.inner, "transfer_notifications").await
    }
}

async fn sqlx_count(store: &SqliteRecordStore, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    sqlx::query_scalar::<_, i64>(&sql)
        .fetch_one(store.pool())
        .await
        .expect("count rows")
}

pub fn set(flag: &AtomicBool) {
    flag.store(true, Ordering::SeqCst);
}

pub fn alice() -> Session {
    Session::new("u1", "alice@example.com").with_name("Alice")
}

pub fn request(file_name: &str, recipient: &str) -> TransferRequest {
    let bytes = Bytes::from(vec![7u8; 2048]);
    TransferRequest {
        recipient_email: recipient.to_string(),
        file_name: file_name.to_string(),
        file_size: bytes.len() as u64,
        file_type: "application/pdf".to_string(),
        bytes,
    }
}

pub fn report_for_bob() -> TransferRequest {
    request("report.pdf", "bob@example.com")
}
