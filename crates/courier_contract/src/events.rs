use serde::{Deserialize, Serialize};

use crate::models::{NotificationId, Transfer};

/// Discrete observations leaving the core. Intermediate statuses are never
/// published.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransferEvent {
    Completed {
        transfer: Transfer,
    },
    Failed {
        provisional_id: String,
        file_name: String,
        recipient_email: String,
        error: String,
    },
    NotificationRead {
        notification_id: NotificationId,
    },
}

impl TransferEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            TransferEvent::Completed { .. } => "transfer.completed",
            TransferEvent::Failed { .. } => "transfer.failed",
            TransferEvent::NotificationRead { .. } => "notification.read",
        }
    }
}
