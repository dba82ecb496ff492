mod record;
mod repository;

pub use record::RecordStore;
pub use repository::{format_timestamp, SqliteRecordStore, StorageConfig};
