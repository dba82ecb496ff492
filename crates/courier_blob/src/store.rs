use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;

/// Bucket-wide object size limit applied when none is configured (100 MiB).
pub const DEFAULT_MAX_OBJECT_BYTES: u64 = 100 * 1024 * 1024;

const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("object already exists: {0}")]
    AlreadyExists(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub overwrite: bool,
}

impl UploadOptions {
    pub fn no_overwrite() -> Self {
        Self { overwrite: false }
    }
}

/// Byte storage for transfer payloads.
#[async_trait]
pub trait BlobStore: Send + Sync {
    fn name(&self) -> &str;

    /// Provisions the bucket/root if needed.
    async fn ensure_ready(&self) -> Result<(), BlobError>;

    /// Stores `bytes` under `key`. With `overwrite: false` an existing
    /// object is an error and is left untouched.
    async fn upload(&self, key: &str, bytes: Bytes, options: UploadOptions)
        -> Result<(), BlobError>;

    async fn public_url(&self, key: &str) -> Result<String, BlobError>;

    async fn fetch(&self, key: &str) -> Result<Bytes, BlobError>;

    async fn delete(&self, key: &str) -> Result<(), BlobError>;
}

/// Rejects keys that are empty, absolute, or escape their prefix.
pub fn validate_key(key: &str) -> Result<(), BlobError> {
    if key.is_empty() {
        return Err(BlobError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(BlobError::InvalidKey(format!("key must be relative: {key}")));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(BlobError::InvalidKey(format!("malformed key: {key}")));
    }
    Ok(())
}

pub(crate) fn check_size(size: u64, limit: Option<u64>) -> Result<(), BlobError> {
    match limit {
        Some(limit) if size > limit => Err(BlobError::TooLarge { size, limit }),
        _ => Ok(()),
    }
}

/// `{base}/{key}` with each key segment percent-encoded.
pub fn join_public_url(base: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
        .collect();
    format!("{}/{}", base.trim_end_matches('/'), encoded.join("/"))
}
