use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use courier_contract::{
    NewNotification, NewTransfer, Notification, NotificationWithTransfer, Progress, SenderProfile,
    Transfer, TransferStatus,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::record::RecordStore;

const SCHEMA_SQL: &str = include_str!("sql/schema.sql");

const TRANSFER_COLUMNS: &str = "t.id, t.sender_id, t.recipient_email, t.file_name, t.file_size, t.file_type, t.file_url, t.status, t.progress, t.created_at, t.completed_at, t.transfer_code, t.expires_at, p.id AS sender_profile_id, p.email AS sender_email, p.name AS sender_name";

const TRANSFER_JOIN: &str = "file_transfers t LEFT JOIN profiles p ON p.id = t.sender_id";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub sqlite_path: String,
}

#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, FromRow)]
struct TransferRow {
    id: String,
    sender_id: String,
    recipient_email: String,
    file_name: String,
    file_size: i64,
    file_type: String,
    file_url: String,
    status: String,
    progress: i64,
    created_at: String,
    completed_at: Option<String>,
    transfer_code: Option<String>,
    expires_at: Option<String>,
    sender_profile_id: Option<String>,
    sender_email: Option<String>,
    sender_name: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
struct NotificationRow {
    notification_id: String,
    notification_transfer_id: String,
    notification_recipient: String,
    message: String,
    is_read: bool,
    notification_created_at: String,
    #[sqlx(flatten)]
    transfer: TransferRow,
}

impl TransferRow {
    fn into_transfer(self) -> Result<Transfer> {
        let sender = match (self.sender_profile_id, self.sender_email) {
            (Some(id), Some(email)) => Some(SenderProfile {
                id,
                email,
                name: self.sender_name,
            }),
            _ => None,
        };
        let progress = u8::try_from(self.progress)
            .with_context(|| format!("progress out of range for transfer {}", self.id))?;

        Ok(Transfer {
            file_size: u64::try_from(self.file_size)
                .with_context(|| format!("negative file size for transfer {}", self.id))?,
            status: TransferStatus::from_str(&self.status)
                .with_context(|| format!("bad status for transfer {}", self.id))?,
            progress: Progress::new(progress),
            created_at: parse_timestamp(&self.created_at)?,
            completed_at: self.completed_at.as_deref().map(parse_timestamp).transpose()?,
            expires_at: self.expires_at.as_deref().map(parse_timestamp).transpose()?,
            id: self.id,
            sender_id: self.sender_id,
            recipient_email: self.recipient_email,
            file_name: self.file_name,
            file_type: self.file_type,
            file_url: self.file_url,
            transfer_code: self.transfer_code,
            sender,
        })
    }
}

impl NotificationRow {
    fn into_joined(self) -> Result<NotificationWithTransfer> {
        Ok(NotificationWithTransfer {
            notification: Notification {
                created_at: parse_timestamp(&self.notification_created_at)?,
                id: self.notification_id,
                transfer_id: self.notification_transfer_id,
                recipient_email: self.notification_recipient,
                message: self.message,
                is_read: self.is_read,
            },
            transfer: self.transfer.into_transfer()?,
        })
    }
}

impl SqliteRecordStore {
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let in_memory = is_memory_path(&config.sqlite_path);
        let uri = normalize_sqlite_uri(&config.sqlite_path);
        let mut options = SqliteConnectOptions::from_str(&uri)
            .with_context(|| format!("invalid sqlite URI: {}", uri))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Each in-memory connection is its own database.
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("failed to connect sqlite pool")?;

        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA_SQL.split(';') {
            let sql = statement.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("migration failed for statement: {sql}"))?;
        }
        info!("courier sqlite schema ready");
        Ok(())
    }

    async fn list_transfers_where(&self, column: &str, value: &str) -> Result<Vec<Transfer>> {
        let sql = format!(
            "SELECT {TRANSFER_COLUMNS} FROM {TRANSFER_JOIN} WHERE t.{column} = ? ORDER BY t.created_at DESC, t.rowid DESC"
        );
        let rows = sqlx::query_as::<_, TransferRow>(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("query transfers by {column}"))?;

        rows.into_iter().map(TransferRow::into_transfer).collect()
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping")?;
        Ok(())
    }

    async fn upsert_profile(&self, profile: &SenderProfile) -> Result<()> {
        let now = format_timestamp(Utc::now());
        sqlx::query(
            "INSERT INTO profiles(id, email, name, updated_at) VALUES (?, ?, ?, ?) ON CONFLICT(id) DO UPDATE SET email = excluded.email, name = excluded.name, updated_at = excluded.updated_at",
        )
        .bind(&profile.id)
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert profile {}", profile.id))?;
        Ok(())
    }

    async fn insert_transfer(&self, transfer: NewTransfer) -> Result<Transfer> {
        let transfer_id = Uuid::now_v7().to_string();
        let now = format_timestamp(Utc::now());
        let file_size = i64::try_from(transfer.file_size).context("file size exceeds i64")?;

        let mut tx = self.pool.begin().await.context("begin transfer insert")?;

        sqlx::query(
            "INSERT INTO file_transfers(id, sender_id, recipient_email, file_name, file_size, file_type, file_url, status, progress, created_at, completed_at, transfer_code, expires_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&transfer_id)
        .bind(&transfer.sender_id)
        .bind(&transfer.recipient_email)
        .bind(&transfer.file_name)
        .bind(file_size)
        .bind(&transfer.file_type)
        .bind(&transfer.file_url)
        .bind(transfer.status.as_str())
        .bind(i64::from(transfer.progress.value()))
        .bind(&now)
        .bind(transfer.completed_at.map(format_timestamp))
        .bind(&transfer.transfer_code)
        .bind(transfer.expires_at.map(format_timestamp))
        .execute(&mut *tx)
        .await
        .context("insert transfer")?;

        let sql = format!("SELECT {TRANSFER_COLUMNS} FROM {TRANSFER_JOIN} WHERE t.id = ?");
        let row = sqlx::query_as::<_, TransferRow>(&sql)
            .bind(&transfer_id)
            .fetch_one(&mut *tx)
            .await
            .context("read back transfer with sender")?;

        tx.commit().await.context("commit transfer insert")?;
        debug!(transfer_id = %transfer_id, "transfer row persisted");
        row.into_transfer()
    }

    async fn get_transfer(&self, transfer_id: &str) -> Result<Option<Transfer>> {
        let sql = format!("SELECT {TRANSFER_COLUMNS} FROM {TRANSFER_JOIN} WHERE t.id = ?");
        sqlx::query_as::<_, TransferRow>(&sql)
            .bind(transfer_id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("query transfer {transfer_id}"))?
            .map(TransferRow::into_transfer)
            .transpose()
    }

    async fn list_transfers_by_sender(&self, sender_id: &str) -> Result<Vec<Transfer>> {
        self.list_transfers_where("sender_id", sender_id).await
    }

    async fn list_transfers_by_recipient(&self, recipient_email: &str) -> Result<Vec<Transfer>> {
        self.list_transfers_where("recipient_email", recipient_email)
            .await
    }

    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification> {
        let notification_id = Uuid::now_v7().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO transfer_notifications(id, transfer_id, recipient_email, message, is_read, created_at) VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(&notification_id)
        .bind(&notification.transfer_id)
        .bind(&notification.recipient_email)
        .bind(&notification.message)
        .bind(format_timestamp(now))
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert notification for transfer {}", notification.transfer_id))?;

        Ok(Notification {
            id: notification_id,
            transfer_id: notification.transfer_id,
            recipient_email: notification.recipient_email,
            message: notification.message,
            is_read: false,
            created_at: parse_timestamp(&format_timestamp(now))?,
        })
    }

    async fn list_unread_notifications(
        &self,
        recipient_email: &str,
    ) -> Result<Vec<NotificationWithTransfer>> {
        let sql = format!(
            "SELECT n.id AS notification_id, n.transfer_id AS notification_transfer_id, n.recipient_email AS notification_recipient, n.message, n.is_read, n.created_at AS notification_created_at, {TRANSFER_COLUMNS} FROM transfer_notifications n JOIN {TRANSFER_JOIN} ON t.id = n.transfer_id WHERE n.recipient_email = ? AND n.is_read = 0 ORDER BY n.created_at DESC, n.rowid DESC"
        );
        let rows = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(recipient_email)
            .fetch_all(&self.pool)
            .await
            .context("query unread notifications")?;

        rows.into_iter().map(NotificationRow::into_joined).collect()
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE transfer_notifications SET is_read = 1 WHERE id = ? AND is_read = 0",
        )
        .bind(notification_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("mark notification {notification_id} read"))?;
        Ok(result.rows_affected() > 0)
    }
}

/// Fixed-width UTC text so lexical order matches chronological order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .with_context(|| format!("invalid stored timestamp {raw}"))
}

fn is_memory_path(raw: &str) -> bool {
    matches!(raw, ":memory:" | "sqlite::memory:")
}

fn normalize_sqlite_uri(raw: &str) -> String {
    if is_memory_path(raw) {
        "sqlite::memory:".to_string()
    } else if raw.starts_with("sqlite:") {
        raw.to_string()
    } else {
        format!("sqlite://{raw}")
    }
}
