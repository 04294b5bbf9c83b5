//! Resolves a single stored image.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use blobgate_common::{BlobName, Error, Result};
use blobgate_storage::{BlobProperties, ByteStream, FileStorageResponse, RemoteStorage};

use crate::cache_control::parse_max_age;

/// Cache-relevant metadata of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMetadata {
    /// Last modification time of the source blob.
    pub last_modified: DateTime<Utc>,
    /// MIME type of the source blob.
    pub content_type: Option<String>,
    /// `max-age` from the blob's `Cache-Control`, if any.
    pub cache_max_age: Option<Duration>,
    /// Size of the source blob in bytes.
    pub content_length: u64,
}

/// Gives access to one image found in remote storage.
pub struct ImageResolver {
    storage: Arc<dyn RemoteStorage>,
    name: BlobName,
    properties: BlobProperties,
}

impl ImageResolver {
    /// Create a resolver for a blob whose properties were already fetched.
    pub fn new(storage: Arc<dyn RemoteStorage>, name: BlobName, properties: BlobProperties) -> Self {
        Self {
            storage,
            name,
            properties,
        }
    }

    /// Blob this resolver reads from.
    pub fn name(&self) -> &BlobName {
        &self.name
    }

    /// Raw blob properties.
    pub fn properties(&self) -> &BlobProperties {
        &self.properties
    }

    /// Cache metadata for the image.
    ///
    /// # Errors
    /// - `Storage` if the blob has no last-modified time
    pub fn metadata(&self) -> Result<ImageMetadata> {
        let last_modified = self.properties.last_modified.ok_or_else(|| {
            Error::Storage(format!(
                "Last modified value not found for file {}",
                self.name
            ))
        })?;

        Ok(ImageMetadata {
            last_modified,
            content_type: self.properties.content_type.clone(),
            cache_max_age: self
                .properties
                .cache_control
                .as_deref()
                .and_then(parse_max_age),
            content_length: self.properties.content_length,
        })
    }

    /// Open the image content.
    ///
    /// # Errors
    /// - `NotFound` if the blob disappeared since it was resolved
    pub async fn open_read(&self) -> Result<ByteStream> {
        Ok(self.open_content().await?.stream)
    }

    /// Open the image content together with its current length and type.
    ///
    /// # Errors
    /// - `NotFound` if the blob disappeared since it was resolved
    pub async fn open_content(&self) -> Result<FileStorageResponse> {
        match self.storage.get_content(&self.name).await {
            Ok(response) => Ok(response),
            Err(Error::NotFound(_)) => {
                tracing::warn!(blob = %self.name, "resolved image no longer exists");
                Err(Error::NotFound(format!(
                    "Image resolver failed to find file {}",
                    self.name
                )))
            }
            Err(e) => Err(e),
        }
    }
}
