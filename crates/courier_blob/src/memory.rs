use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::debug;

use crate::store::{check_size, join_public_url, validate_key, BlobError, BlobStore, UploadOptions};

/// Blob store held in a `HashMap`, for tests and embedding.
#[derive(Debug)]
pub struct InMemoryBlobStore {
    public_base_url: String,
    max_object_bytes: Option<u64>,
    objects: RwLock<HashMap<String, Bytes>>,
}

impl InMemoryBlobStore {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into(),
            max_object_bytes: None,
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_max_object_bytes(mut self, limit: u64) -> Self {
        self.max_object_bytes = Some(limit);
        self
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ensure_ready(&self) -> Result<(), BlobError> {
        Ok(())
    }

    async fn upload(
        &self,
        key: &str,
        bytes: Bytes,
        options: UploadOptions,
    ) -> Result<(), BlobError> {
        validate_key(key)?;
        check_size(bytes.len() as u64, self.max_object_bytes)?;

        let mut objects = self.objects.write().await;
        if !options.overwrite && objects.contains_key(key) {
            return Err(BlobError::AlreadyExists(key.to_string()));
        }
        debug!(key = %key, size = bytes.len(), "stored object in memory");
        objects.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn public_url(&self, key: &str) -> Result<String, BlobError> {
        validate_key(key)?;
        Ok(join_public_url(&self.public_base_url, key))
    }

    async fn fetch(&self, key: &str) -> Result<Bytes, BlobError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        match self.objects.write().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(BlobError::NotFound(key.to_string())),
        }
    }
}
