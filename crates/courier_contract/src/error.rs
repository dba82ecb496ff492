use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Transfer;

/// Terminal failure of one `initiate_transfer` call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("Unauthenticated: user not authenticated")]
    Unauthenticated,
    #[error("UploadFailed: {0}")]
    UploadFailed(String),
    #[error("RecordFailed: {0}")]
    RecordFailed(String),
    #[error("Unknown: {0}")]
    Unknown(String),
}

impl TransferError {
    pub fn kind(&self) -> &'static str {
        match self {
            TransferError::Unauthenticated => "unauthenticated",
            TransferError::UploadFailed(_) => "upload_failed",
            TransferError::RecordFailed(_) => "record_failed",
            TransferError::Unknown(_) => "unknown",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownloadError {
    #[error("transfer not found")]
    NotFound,
    #[error("file URL not available")]
    Unavailable,
}

/// Wire shape of an `initiate_transfer` result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<Transfer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Result<Transfer, TransferError>> for TransferResponse {
    fn from(result: &Result<Transfer, TransferError>) -> Self {
        match result {
            Ok(transfer) => TransferResponse {
                success: true,
                transfer: Some(transfer.clone()),
                error: None,
            },
            Err(error) => TransferResponse {
                success: false,
                transfer: None,
                error: Some(error.to_string()),
            },
        }
    }
}
