//! Blob store rooted in a local directory.
//!
//! Object keys map to relative paths under the root. Uploads open the target
//! with `create_new`, so an existing file is never replaced unless the caller
//! asks for an overwrite.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::store::{check_size, join_public_url, validate_key, BlobError, BlobStore, UploadOptions};

#[derive(Debug, Clone)]
pub struct FilesystemBlobStore {
    root: PathBuf,
    public_base_url: String,
    max_object_bytes: Option<u64>,
}

impl FilesystemBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
            max_object_bytes: None,
        }
    }

    pub fn with_max_object_bytes(mut self, limit: u64) -> Self {
        self.max_object_bytes = Some(limit);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, BlobError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

fn not_found_or_io(key: &str, error: std::io::Error) -> BlobError {
    if error.kind() == ErrorKind::NotFound {
        BlobError::NotFound(key.to_string())
    } else {
        BlobError::Io(error)
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn ensure_ready(&self) -> Result<(), BlobError> {
        if fs::try_exists(&self.root).await? {
            if !fs::metadata(&self.root).await?.is_dir() {
                return Err(BlobError::Unavailable(format!(
                    "blob root {} is not a directory",
                    self.root.display()
                )));
            }
            return Ok(());
        }
        fs::create_dir_all(&self.root).await?;
        info!(root = %self.root.display(), "created blob root");
        Ok(())
    }

    async fn upload(
        &self,
        key: &str,
        bytes: Bytes,
        options: UploadOptions,
    ) -> Result<(), BlobError> {
        let path = self.object_path(key)?;
        check_size(bytes.len() as u64, self.max_object_bytes)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut open = fs::OpenOptions::new();
        open.write(true);
        if options.overwrite {
            open.create(true).truncate(true);
        } else {
            open.create_new(true);
        }

        let mut file = match open.open(&path).await {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                return Err(BlobError::AlreadyExists(key.to_string()));
            }
            Err(error) => return Err(BlobError::Io(error)),
        };

        let written = async {
            file.write_all(&bytes).await?;
            file.sync_all().await
        }
        .await;

        if let Err(error) = written {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&path).await {
                warn!(key = %key, error = %cleanup, "failed to remove partial object");
            }
            return Err(BlobError::Io(error));
        }

        debug!(key = %key, size = bytes.len(), "stored object on disk");
        Ok(())
    }

    async fn public_url(&self, key: &str) -> Result<String, BlobError> {
        validate_key(key)?;
        Ok(join_public_url(&self.public_base_url, key))
    }

    async fn fetch(&self, key: &str) -> Result<Bytes, BlobError> {
        let path = self.object_path(key)?;
        fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|error| not_found_or_io(key, error))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.object_path(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|error| not_found_or_io(key, error))
    }
}
