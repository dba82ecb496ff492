pub mod filesystem;
pub mod key;
pub mod memory;
pub mod store;

pub use filesystem::FilesystemBlobStore;
pub use key::StorageKeyGenerator;
pub use memory::InMemoryBlobStore;
pub use store::{
    join_public_url, validate_key, BlobError, BlobStore, UploadOptions, DEFAULT_MAX_OBJECT_BYTES,
};
