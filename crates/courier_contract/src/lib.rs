pub mod error;
pub mod events;
pub mod models;
pub mod session;
pub mod status;

pub use error::{DownloadError, TransferError, TransferResponse};
pub use events::TransferEvent;
pub use models::{
    generate_transfer_code, NewNotification, NewTransfer, Notification, NotificationId,
    NotificationWithTransfer, ProvisionalTransfer, SenderProfile, Transfer, TransferId,
    TransferRequest, UserId,
};
pub use session::{IdentityProvider, Session, StaticIdentityProvider};
pub use status::{Progress, ProgressOutOfRange, TransferStatus, UnknownStatus};
