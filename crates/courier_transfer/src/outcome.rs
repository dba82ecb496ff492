use courier_contract::{ProvisionalTransfer, Transfer, TransferError, TransferResponse, TransferStatus};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// Result of a best-effort action attached to a transfer call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SideEffect {
    NotAttempted,
    Succeeded,
    Failed(String),
}

impl SideEffect {
    pub fn is_failed(&self) -> bool {
        matches!(self, SideEffect::Failed(_))
    }
}

/// Handle to a compensating blob delete running in the background.
#[derive(Debug)]
pub struct Compensation {
    pub key: String,
    handle: JoinHandle<SideEffect>,
}

impl Compensation {
    pub(crate) fn new(key: String, handle: JoinHandle<SideEffect>) -> Self {
        Self { key, handle }
    }

    /// Waits for the delete to finish.
    pub async fn settle(self) -> SideEffect {
        match self.handle.await {
            Ok(effect) => effect,
            Err(join_error) => SideEffect::Failed(format!("compensation task aborted: {join_error}")),
        }
    }
}

/// Primary outcome of `initiate_transfer`, kept apart from its side effects.
#[derive(Debug)]
pub struct TransferOutcome {
    pub provisional: ProvisionalTransfer,
    pub result: Result<Transfer, TransferError>,
    pub notification: SideEffect,
    pub compensation: Option<Compensation>,
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Terminal status observed by the caller.
    pub fn status(&self) -> TransferStatus {
        match &self.result {
            Ok(transfer) => transfer.status,
            Err(_) => TransferStatus::Failed,
        }
    }

    pub fn to_response(&self) -> TransferResponse {
        TransferResponse::from(&self.result)
    }
}
