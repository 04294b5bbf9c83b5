//! Remote storage trait definition.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

use blobgate_common::{BlobName, Result};

/// Byte stream type for upload/download operations.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Properties of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobProperties {
    /// Blob name within its container.
    pub name: String,
    /// Size in bytes.
    pub content_length: u64,
    /// MIME type recorded at upload time.
    pub content_type: Option<String>,
    /// Raw `Cache-Control` value stored with the blob.
    pub cache_control: Option<String>,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
    /// ETag for conditional requests.
    pub etag: Option<String>,
}

/// Content of a blob opened for reading.
pub struct FileStorageResponse {
    /// Name the content was read from.
    pub file_name: String,
    /// Size of the content in bytes.
    pub content_length: u64,
    /// MIME type, if the blob has one.
    pub content_type: Option<String>,
    /// Blob content. Dropping the stream releases the underlying connection.
    pub stream: ByteStream,
}

impl FileStorageResponse {
    /// Drain the stream into a single buffer.
    pub async fn into_bytes(mut self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.content_length as usize);
        while let Some(chunk) = self.stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl fmt::Debug for FileStorageResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStorageResponse")
            .field("file_name", &self.file_name)
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Remote storage trait implemented by every blob backend.
///
/// Implementations must handle their own authentication.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Get the backend name (e.g., "azure", "local", "memory").
    fn name(&self) -> &str;

    /// Store `data` under `name`, replacing any existing blob.
    ///
    /// `content_type` is recorded only when it is `Some` and non-empty.
    ///
    /// # Preconditions
    /// - `data` is the complete content to upload
    ///
    /// # Postconditions
    /// - Blob is created or replaced at `name`
    /// - Last-modified time and etag reflect this upload
    ///
    /// # Errors
    /// - Network/I/O errors
    /// - Authentication errors
    async fn save(&self, name: &BlobName, data: Bytes, content_type: Option<&str>) -> Result<()>;

    /// Store the content of a stream under `name`.
    ///
    /// The default implementation buffers the whole stream and calls `save`.
    async fn save_stream(
        &self,
        name: &BlobName,
        mut stream: ByteStream,
        content_type: Option<&str>,
    ) -> Result<()> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        self.save(name, buf.freeze(), content_type).await
    }

    /// Delete a blob if it exists.
    ///
    /// # Postconditions
    /// - No blob exists at `name`
    /// - Deleting a blob that does not exist succeeds
    async fn delete(&self, name: &BlobName) -> Result<()>;

    /// Open a blob for reading.
    ///
    /// # Preconditions
    /// - Blob must exist at `name`
    ///
    /// # Postconditions
    /// - `content_length` and `content_type` describe the returned stream
    ///
    /// # Errors
    /// - `NotFound` if the blob does not exist
    async fn get_content(&self, name: &BlobName) -> Result<FileStorageResponse>;

    /// Check whether a blob exists.
    ///
    /// Only a missing blob yields `false`; every other failure is returned.
    async fn exists(&self, name: &BlobName) -> Result<bool>;

    /// Fetch blob properties, or `None` if the blob does not exist.
    ///
    /// # Errors
    /// - Any failure other than a missing blob
    async fn metadata(&self, name: &BlobName) -> Result<Option<BlobProperties>>;

    /// Path of the blob relative to the storage account.
    fn partial_file_path(&self, name: &BlobName) -> String;
}

/// Content type to record, treating an empty string as absent.
pub(crate) fn effective_content_type(content_type: Option<&str>) -> Option<&str> {
    content_type.filter(|ct| !ct.is_empty())
}
