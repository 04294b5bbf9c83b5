//! Virtual-path reader for the legacy resizing pipeline.
//!
//! Requests under a virtual prefix (default `~/storage/`) are served from
//! blob storage. The first segment after the prefix names the container
//! when the reader is built from a connection string.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use blobgate_common::{BlobName, ContainerName, Error, Result};
use blobgate_storage::{AzureRemoteStorage, AzureStorageConfig, FileStorageResponse, RemoteStorage};

use crate::provider::{decode_blob_name, strip_path_prefix};

/// Virtual prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "~/storage/";

/// Query string of a rewritten request.
pub type QueryString = BTreeMap<String, String>;

/// Reader settings, parsed from plugin arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderSettings {
    /// Azure storage connection string.
    pub connection_string: String,
    /// Public blob endpoint, always ending with `/`.
    pub endpoint: String,
    /// Virtual path prefix.
    pub prefix: String,
    /// Register as a virtual path provider rather than an image provider.
    pub virtual_path_provider: bool,
    /// Cache images even when the request does not modify them.
    pub cache_unmodified: bool,
}

fn arg<'a>(args: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    args.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

fn bool_arg(args: &HashMap<String, String>, key: &str, default: bool) -> Result<bool> {
    match arg(args, key).map(str::trim) {
        None | Some("") => Ok(default),
        Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
        Some(v) => Err(Error::InvalidInput(format!(
            "'{}' must be true or false, got '{}'",
            key, v
        ))),
    }
}

impl ReaderSettings {
    /// Parse settings from plugin arguments.
    ///
    /// Keys are matched case-insensitively: `connectionstring`, `endpoint`,
    /// `prefix`, `vpp` and `cacheunmodified`.
    ///
    /// # Errors
    /// - Endpoint missing
    /// - Connection string missing
    /// - Boolean argument not `true`/`false`
    pub fn from_args(args: &HashMap<String, String>) -> Result<Self> {
        let mut endpoint = arg(args, "endpoint").unwrap_or("").to_string();
        let connection_string = arg(args, "connectionstring").unwrap_or("").to_string();

        if endpoint.is_empty() {
            return Err(Error::Configuration("No endpoint found.".to_string()));
        }
        if connection_string.is_empty() {
            return Err(Error::Configuration(
                "A connection string for the Azure blob storage is required.".to_string(),
            ));
        }

        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }

        let prefix = match arg(args, "prefix") {
            Some(prefix) if !prefix.is_empty() => prefix.to_string(),
            _ => DEFAULT_PREFIX.to_string(),
        };

        Ok(Self {
            connection_string,
            endpoint,
            prefix,
            virtual_path_provider: bool_arg(args, "vpp", true)?,
            cache_unmodified: bool_arg(args, "cacheunmodified", true)?,
        })
    }
}

/// Where blobs for virtual paths come from.
enum StorageSource {
    /// One storage; the whole remainder is the blob name.
    Fixed(Arc<dyn RemoteStorage>),
    /// First segment selects the container of the configured account.
    PerContainer(AzureRemoteStorage),
}

/// Serves virtual paths under a prefix from blob storage.
pub struct AzureReader {
    settings: ReaderSettings,
    path_prefix: String,
    source: StorageSource,
}

/// Strip the app-relative marker so `~/a` and `/a` compare equal.
fn app_relative(path: &str) -> &str {
    path.strip_prefix('~').unwrap_or(path)
}

impl AzureReader {
    /// Create a reader serving every path under the prefix from `storage`.
    pub fn new(settings: ReaderSettings, storage: Arc<dyn RemoteStorage>) -> Self {
        Self::with_source(settings, StorageSource::Fixed(storage))
    }

    /// Create a reader for the account in the settings' connection string.
    ///
    /// # Errors
    /// - Malformed connection string
    pub fn from_settings(settings: ReaderSettings) -> Result<Self> {
        let config = AzureStorageConfig::from_connection_string(&settings.connection_string)?;
        let account = AzureRemoteStorage::new(config.with_container(""))?;
        Ok(Self::with_source(settings, StorageSource::PerContainer(account)))
    }

    fn with_source(settings: ReaderSettings, source: StorageSource) -> Self {
        let path_prefix = app_relative(&settings.prefix)
            .trim_end_matches('/')
            .to_string();
        Self {
            settings,
            path_prefix,
            source,
        }
    }

    /// Reader settings.
    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    /// Whether the reader should be registered as a virtual path provider.
    pub fn uses_virtual_path_provider(&self) -> bool {
        self.settings.virtual_path_provider
    }

    fn remainder<'a>(&self, virtual_path: &'a str) -> Option<&'a str> {
        strip_path_prefix(app_relative(virtual_path), &self.path_prefix)
    }

    /// Whether a virtual path lies under the storage prefix.
    pub fn is_storage_path(&self, virtual_path: &str) -> bool {
        self.remainder(virtual_path).is_some()
    }

    /// Storage and blob name for a virtual path, or `None` when the path
    /// names no file.
    fn resolve(&self, virtual_path: &str) -> Result<Option<(Arc<dyn RemoteStorage>, BlobName)>> {
        let rest = self.remainder(virtual_path).ok_or_else(|| {
            Error::InvalidInput(format!("Not a storage path: {}", virtual_path))
        })?;
        let Some(name) = decode_blob_name(rest)? else {
            return Ok(None);
        };

        match &self.source {
            StorageSource::Fixed(storage) => Ok(Some((Arc::clone(storage), name))),
            StorageSource::PerContainer(account) => {
                let Some((container, blob)) = name.as_str().split_once('/') else {
                    return Ok(None);
                };
                let container = ContainerName::new(container)?;
                let storage: Arc<dyn RemoteStorage> = Arc::new(account.with_container(container));
                Ok(Some((storage, BlobName::parse(blob)?)))
            }
        }
    }

    /// Storage and blob name for a virtual path.
    ///
    /// # Errors
    /// - Path outside the prefix or without a file name
    /// - Invalid container or blob name
    pub fn locate(&self, virtual_path: &str) -> Result<(Arc<dyn RemoteStorage>, BlobName)> {
        self.resolve(virtual_path)?.ok_or_else(|| {
            Error::InvalidInput(format!("Storage path has no file name: {}", virtual_path))
        })
    }

    /// Name of the blob behind a virtual path, within its container.
    pub fn blob_name(&self, virtual_path: &str) -> Result<BlobName> {
        self.locate(virtual_path).map(|(_, name)| name)
    }

    /// Whether the blob behind a virtual path exists.
    ///
    /// Paths outside the prefix, or naming no file, never exist.
    pub async fn file_exists(&self, virtual_path: &str) -> Result<bool> {
        if !self.is_storage_path(virtual_path) {
            return Ok(false);
        }
        match self.resolve(virtual_path)? {
            Some((storage, name)) => storage.exists(&name).await,
            None => Ok(false),
        }
    }

    /// Open the blob behind a virtual path.
    pub async fn open(&self, virtual_path: &str) -> Result<FileStorageResponse> {
        let (storage, name) = self.locate(virtual_path)?;
        storage.get_content(&name).await
    }

    /// Public URL of the blob behind a virtual path.
    pub fn blob_url(&self, virtual_path: &str) -> Result<String> {
        let rest = self.remainder(virtual_path).ok_or_else(|| {
            Error::InvalidInput(format!("Not a storage path: {}", virtual_path))
        })?;
        Ok(format!(
            "{}{}",
            self.settings.endpoint,
            rest.trim_start_matches('/')
        ))
    }

    /// Adjust the query string of a rewritten request.
    ///
    /// Requests for storage paths without any query parameters must still
    /// pass through the pipeline to reach the blob, so they are forced to
    /// be processed and cached according to `cache_unmodified`.
    pub fn post_rewrite(&self, virtual_path: &str, query: &mut QueryString) {
        if !query.is_empty() || !self.is_storage_path(virtual_path) {
            return;
        }

        let cache = if self.settings.cache_unmodified {
            "always"
        } else {
            "no"
        };
        query.insert("cache".to_string(), cache.to_string());
        query.insert("process".to_string(), "always".to_string());

        tracing::debug!(path = virtual_path, cache, "rewrote unprocessed storage request");
    }
}
