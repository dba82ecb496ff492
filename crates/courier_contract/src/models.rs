use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::{Progress, TransferStatus};

pub type TransferId = String;
pub type NotificationId = String;
pub type UserId = String;

/// Sender details joined from the profile directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SenderProfile {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
}

impl SenderProfile {
    /// Name when known, otherwise the email.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

/// A persisted file handoff from a sender to a recipient email.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transfer {
    pub id: TransferId,
    pub sender_id: UserId,
    pub recipient_email: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub file_url: String,
    pub status: TransferStatus,
    pub progress: Progress,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub transfer_code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub sender: Option<SenderProfile>,
}

impl Transfer {
    pub fn has_location(&self) -> bool {
        !self.file_url.trim().is_empty()
    }
}

/// Row handed to the record store; the store assigns id and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTransfer {
    pub sender_id: UserId,
    pub recipient_email: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub file_url: String,
    pub status: TransferStatus,
    pub progress: Progress,
    pub completed_at: Option<DateTime<Utc>>,
    pub transfer_code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub transfer_id: TransferId,
    pub recipient_email: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewNotification {
    pub transfer_id: TransferId,
    pub recipient_email: String,
    pub message: String,
}

impl NewNotification {
    pub fn for_transfer(transfer: &Transfer, fallback_sender: &str) -> Self {
        let from = transfer
            .sender
            .as_ref()
            .map(SenderProfile::display_name)
            .unwrap_or(fallback_sender);
        Self {
            transfer_id: transfer.id.clone(),
            recipient_email: transfer.recipient_email.clone(),
            message: format!("You received a file: {} from {}", transfer.file_name, from),
        }
    }
}

/// Notification joined with its parent transfer (and that transfer's sender).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationWithTransfer {
    #[serde(flatten)]
    pub notification: Notification,
    pub transfer: Transfer,
}

/// Caller input for a single send.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub recipient_email: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub bytes: bytes::Bytes,
}

impl TransferRequest {
    /// The declared type parsed as a MIME type. The declared string is what
    /// gets stored; this is only for inspection.
    pub fn parsed_file_type(&self) -> Option<mime::Mime> {
        self.file_type.trim().parse().ok()
    }
}

/// Unpersisted placeholder that exists while a send is in progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisionalTransfer {
    pub local_id: String,
    pub recipient_email: String,
    pub file_name: String,
    pub file_size: u64,
    pub status: TransferStatus,
    pub progress: Progress,
    pub created_at: DateTime<Utc>,
}

impl ProvisionalTransfer {
    pub fn begin(request: &TransferRequest) -> Self {
        Self {
            local_id: format!("local-{}", Uuid::new_v4()),
            recipient_email: request.recipient_email.clone(),
            file_name: request.file_name.clone(),
            file_size: request.file_size,
            status: TransferStatus::Pending,
            progress: Progress::default(),
            created_at: Utc::now(),
        }
    }

    /// Applies a status change if the state machine allows it.
    pub fn transition(&mut self, next: TransferStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next == TransferStatus::Completed {
            self.progress = Progress::COMPLETE;
        }
        true
    }

    /// Advances progress while the send is in flight. Ignored otherwise.
    pub fn report_progress(&mut self, value: u8) {
        if self.status.is_in_flight() {
            self.progress.advance(value);
        }
    }
}

const CODE_LEN: usize = 8;

/// Short uppercase alphanumeric code a sender can read out to a recipient.
pub fn generate_transfer_code() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(CODE_LEN)
        .collect::<String>()
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TransferRequest {
        TransferRequest {
            recipient_email: "bob@example.com".to_string(),
            file_name: "report.pdf".to_string(),
            file_size: 2048,
            file_type: "application/pdf".to_string(),
            bytes: bytes::Bytes::from_static(b"%PDF"),
        }
    }

    #[test]
    fn provisional_transfer_follows_state_machine() {
        let mut provisional = ProvisionalTransfer::begin(&request());
        assert!(provisional.local_id.starts_with("local-"));
        assert_eq!(provisional.status, TransferStatus::Pending);

        provisional.report_progress(30);
        assert_eq!(provisional.progress.value(), 0);

        assert!(provisional.transition(TransferStatus::Uploading));
        provisional.report_progress(30);
        provisional.report_progress(20);
        assert_eq!(provisional.progress.value(), 30);

        assert!(!provisional.transition(TransferStatus::Completed));
        assert!(provisional.transition(TransferStatus::Transferring));
        assert!(provisional.transition(TransferStatus::Completed));
        assert_eq!(provisional.progress, Progress::COMPLETE);
        assert!(!provisional.transition(TransferStatus::Failed));
    }

    #[test]
    fn declared_file_type_parses_without_rewriting() {
        let mut req = request();
        assert_eq!(
            req.parsed_file_type().map(|m| m.essence_str().to_string()),
            Some("application/pdf".to_string())
        );

        req.file_type = "text/plain; charset=utf-8".to_string();
        let parsed = req.parsed_file_type().expect("parses");
        assert_eq!(parsed.get_param(mime::CHARSET), Some(mime::UTF_8));
        assert_eq!(req.file_type, "text/plain; charset=utf-8");

        req.file_type = "not a mime".to_string();
        assert!(req.parsed_file_type().is_none());
    }

    #[test]
    fn transfer_codes_are_short_and_uppercase() {
        let code = generate_transfer_code();
        assert_eq!(code.len(), CODE_LEN);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn notification_names_sender_or_falls_back() {
        let mut transfer = Transfer {
            id: "t1".to_string(),
            sender_id: "u1".to_string(),
            recipient_email: "bob@example.com".to_string(),
            file_name: "report.pdf".to_string(),
            file_size: 2048,
            file_type: "application/pdf".to_string(),
            file_url: "http://blobs/u1/1_report.pdf".to_string(),
            status: TransferStatus::Completed,
            progress: Progress::COMPLETE,
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
            transfer_code: None,
            expires_at: None,
            sender: None,
        };

        let note = NewNotification::for_transfer(&transfer, "alice@example.com");
        assert_eq!(
            note.message,
            "You received a file: report.pdf from alice@example.com"
        );

        transfer.sender = Some(SenderProfile {
            id: "u1".to_string(),
            email: "alice@example.com".to_string(),
            name: Some("Alice".to_string()),
        });
        let note = NewNotification::for_transfer(&transfer, "ignored");
        assert_eq!(note.message, "You received a file: report.pdf from Alice");
        assert_eq!(note.transfer_id, "t1");
    }
}
