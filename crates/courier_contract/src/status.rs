use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client-observable lifecycle of one transfer.
///
/// `Pending`, `Uploading` and `Transferring` only ever exist on provisional
/// transfers and in presentation layers. The orchestrator itself reports
/// `Completed` or `Failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Uploading,
    Transferring,
    Completed,
    Failed,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown transfer status: {0}")]
pub struct UnknownStatus(pub String);

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Uploading => "uploading",
            TransferStatus::Transferring => "transferring",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Failed)
    }

    /// Forward-only transitions; `Failed` is reachable from every
    /// non-terminal state and absorbs.
    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Failed) => true,
            (Pending, Uploading) => true,
            (Uploading, Transferring) => true,
            (Transferring, Completed) => true,
            _ => false,
        }
    }

    /// Whether progress is still allowed to move.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TransferStatus::Uploading | TransferStatus::Transferring)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransferStatus::Pending),
            "uploading" => Ok(TransferStatus::Uploading),
            "transferring" => Ok(TransferStatus::Transferring),
            "completed" => Ok(TransferStatus::Completed),
            "failed" => Ok(TransferStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Advisory progress percentage, clamped to 0..=100 and never decreasing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "u8", into = "u8")]
pub struct Progress(u8);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("progress {0} is outside 0..=100")]
pub struct ProgressOutOfRange(pub u8);

impl TryFrom<u8> for Progress {
    type Error = ProgressOutOfRange;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > 100 {
            return Err(ProgressOutOfRange(value));
        }
        Ok(Progress(value))
    }
}

impl From<Progress> for u8 {
    fn from(progress: Progress) -> Self {
        progress.0
    }
}

impl Progress {
    pub const COMPLETE: Progress = Progress(100);

    pub fn new(value: u8) -> Self {
        Progress(value.min(100))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Moves progress forward; lower values are ignored.
    pub fn advance(&mut self, to: u8) {
        let to = to.min(100);
        if to > self.0 {
            self.0 = to;
        }
    }
}
