//! Local filesystem storage backend.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio_util::io::ReaderStream;

use blobgate_common::{BlobName, Error, Result};

use crate::provider::{
    effective_content_type, BlobProperties, FileStorageResponse, RemoteStorage,
};

/// Directory under the root that holds blob properties.
const PROPERTIES_DIR: &str = ".blobgate";

/// Properties persisted next to each blob.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Sidecar {
    content_type: Option<String>,
    cache_control: Option<String>,
}

/// Local filesystem storage backend.
///
/// Stores each blob as a file under the root directory, mirroring the
/// `/`-separated blob name as nested directories.
pub struct LocalStorage {
    root: PathBuf,
    cache_control: Option<String>,
}

impl LocalStorage {
    /// Create a new local backend with the given root directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self {
            root,
            cache_control: None,
        })
    }

    /// Record `cache_control` on every saved blob.
    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }

    /// Root directory of this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_name(name: &BlobName) -> Result<()> {
        if name.segments().next() == Some(PROPERTIES_DIR) {
            return Err(Error::InvalidInput(format!(
                "Blob names may not start with '{}'",
                PROPERTIES_DIR
            )));
        }
        Ok(())
    }

    fn to_fs_path(&self, name: &BlobName) -> PathBuf {
        let mut fs_path = self.root.clone();
        for segment in name.segments() {
            fs_path.push(segment);
        }
        fs_path
    }

    fn sidecar_path(&self, name: &BlobName) -> PathBuf {
        let mut fs_path = self.root.join(PROPERTIES_DIR);
        for segment in name.segments() {
            fs_path.push(segment);
        }
        fs_path.set_extension(match fs_path.extension() {
            Some(ext) => format!("{}.json", ext.to_string_lossy()),
            None => "json".to_string(),
        });
        fs_path
    }

    async fn read_sidecar(&self, name: &BlobName) -> Result<Sidecar> {
        match fs::read(self.sidecar_path(name)).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if is_missing(&e) => Ok(Sidecar::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Filesystem metadata for a blob, or `None` if no file exists.
    async fn file_metadata(&self, name: &BlobName) -> Result<Option<std::fs::Metadata>> {
        match fs::metadata(self.to_fs_path(name)).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta)),
            Ok(_) => Ok(None),
            Err(e) if is_missing(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether an I/O error means the path does not exist.
///
/// A name below an existing file (`a.png/x`) fails with `NotADirectory`.
fn is_missing(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if is_missing(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl RemoteStorage for LocalStorage {
    fn name(&self) -> &str {
        "local"
    }

    async fn save(&self, name: &BlobName, data: Bytes, content_type: Option<&str>) -> Result<()> {
        Self::check_name(name)?;
        let fs_path = self.to_fs_path(name);
        let sidecar_path = self.sidecar_path(name);

        if let Some(parent) = fs_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Some(parent) = sidecar_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&fs_path, &data).await?;

        let sidecar = Sidecar {
            content_type: effective_content_type(content_type).map(String::from),
            cache_control: self.cache_control.clone(),
        };
        fs::write(&sidecar_path, serde_json::to_vec(&sidecar)?).await?;

        tracing::debug!(blob = %name, bytes = data.len(), "saved blob to local storage");
        Ok(())
    }

    async fn delete(&self, name: &BlobName) -> Result<()> {
        Self::check_name(name)?;
        remove_if_exists(&self.to_fs_path(name)).await?;
        remove_if_exists(&self.sidecar_path(name)).await?;
        Ok(())
    }

    async fn get_content(&self, name: &BlobName) -> Result<FileStorageResponse> {
        Self::check_name(name)?;
        let meta = self
            .file_metadata(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Blob not found: {}", name)))?;
        let sidecar = self.read_sidecar(name).await?;

        let file = fs::File::open(self.to_fs_path(name)).await?;
        let stream = ReaderStream::new(file).map(|chunk| chunk.map_err(Error::from));

        Ok(FileStorageResponse {
            file_name: name.to_string(),
            content_length: meta.len(),
            content_type: sidecar.content_type,
            stream: Box::pin(stream),
        })
    }

    async fn exists(&self, name: &BlobName) -> Result<bool> {
        Self::check_name(name)?;
        Ok(self.file_metadata(name).await?.is_some())
    }

    async fn metadata(&self, name: &BlobName) -> Result<Option<BlobProperties>> {
        Self::check_name(name)?;
        let Some(meta) = self.file_metadata(name).await? else {
            return Ok(None);
        };
        let sidecar = self.read_sidecar(name).await?;

        let modified: Option<DateTime<Utc>> = meta.modified().ok().map(Into::into);

        Ok(Some(BlobProperties {
            name: name.to_string(),
            content_length: meta.len(),
            content_type: sidecar.content_type,
            cache_control: sidecar.cache_control,
            last_modified: modified,
            etag: modified.map(|m| format!("\"{}-{}\"", m.timestamp(), meta.len())),
        }))
    }

    fn partial_file_path(&self, name: &BlobName) -> String {
        name.to_string()
    }
}
