//! In-memory storage backend for testing.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::stream;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use blobgate_common::{BlobName, ContainerName, Error, Result};

use crate::provider::{
    effective_content_type, BlobProperties, FileStorageResponse, RemoteStorage,
};

/// A blob held in memory.
#[derive(Debug, Clone)]
struct StoredBlob {
    data: Bytes,
    properties: BlobProperties,
}

/// In-memory storage backend.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop.
pub struct MemoryStorage {
    blobs: Arc<RwLock<HashMap<String, StoredBlob>>>,
    container: Option<ContainerName>,
    cache_control: Option<String>,
}

impl MemoryStorage {
    /// Create a new empty memory backend.
    pub fn new() -> Self {
        Self {
            blobs: Arc::new(RwLock::new(HashMap::new())),
            container: None,
            cache_control: None,
        }
    }

    /// Report partial paths as if blobs lived in `container`.
    pub fn with_container(mut self, container: ContainerName) -> Self {
        self.container = Some(container);
        self
    }

    /// Record `cache_control` on every saved blob.
    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }

    /// Seed a blob with explicit properties.
    ///
    /// `content_length` is taken from `data`.
    pub fn insert(&self, mut properties: BlobProperties, data: Bytes) -> Result<()> {
        properties.content_length = data.len() as u64;
        let key = properties.name.clone();
        self.write()?.insert(key, StoredBlob { data, properties });
        Ok(())
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.read().map(|blobs| blobs.len()).unwrap_or(0)
    }

    /// Check if no blobs are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, StoredBlob>>> {
        self.blobs
            .read()
            .map_err(|_| Error::Storage("Memory storage lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, StoredBlob>>> {
        self.blobs
            .write()
            .map_err(|_| Error::Storage("Memory storage lock poisoned".to_string()))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStorage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save(&self, name: &BlobName, data: Bytes, content_type: Option<&str>) -> Result<()> {
        let properties = BlobProperties {
            name: name.to_string(),
            content_length: data.len() as u64,
            content_type: effective_content_type(content_type).map(String::from),
            cache_control: self.cache_control.clone(),
            last_modified: Some(Utc::now()),
            etag: Some(format!("\"{}\"", Uuid::new_v4())),
        };

        self.write()?
            .insert(name.to_string(), StoredBlob { data, properties });
        Ok(())
    }

    async fn delete(&self, name: &BlobName) -> Result<()> {
        self.write()?.remove(name.as_str());
        Ok(())
    }

    async fn get_content(&self, name: &BlobName) -> Result<FileStorageResponse> {
        let blob = self
            .read()?
            .get(name.as_str())
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Blob not found: {}", name)))?;

        let data = blob.data;
        Ok(FileStorageResponse {
            file_name: name.to_string(),
            content_length: data.len() as u64,
            content_type: blob.properties.content_type,
            stream: Box::pin(stream::once(async move { Ok(data) })),
        })
    }

    async fn exists(&self, name: &BlobName) -> Result<bool> {
        Ok(self.read()?.contains_key(name.as_str()))
    }

    async fn metadata(&self, name: &BlobName) -> Result<Option<BlobProperties>> {
        Ok(self
            .read()?
            .get(name.as_str())
            .map(|blob| blob.properties.clone()))
    }

    fn partial_file_path(&self, name: &BlobName) -> String {
        match &self.container {
            Some(container) if !container.is_root() => format!("{}/{}", container, name),
            _ => name.to_string(),
        }
    }
}
