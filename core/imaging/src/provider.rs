//! Image provider backed by remote storage.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use blobgate_common::{BlobName, Error, Result};
use blobgate_storage::RemoteStorage;

use crate::resolver::ImageResolver;

/// Image provider options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageProviderOptions {
    /// App-relative URL prefix served from storage, e.g. `~/images`.
    pub url_prefix: String,
}

/// Strip `prefix` from `path` on a segment boundary, ignoring ASCII case.
///
/// An empty prefix matches every path. Returns the remainder, which is
/// empty or starts with `/`.
pub(crate) fn strip_path_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let head = path.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let rest = &path[prefix.len()..];
    if rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Decode a request path remainder into a blob name.
pub(crate) fn decode_blob_name(rest: &str) -> Result<Option<BlobName>> {
    let decoded = percent_decode_str(rest)
        .decode_utf8()
        .map_err(|e| Error::InvalidInput(format!("Path is not valid UTF-8: {}", e)))?;
    let trimmed = decoded.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(None);
    }
    BlobName::parse(trimmed).map(Some)
}

/// Serves images whose request path falls under a URL prefix.
pub struct ImageProvider {
    storage: Arc<dyn RemoteStorage>,
    path_prefix: String,
}

impl ImageProvider {
    /// Create a provider.
    ///
    /// # Errors
    /// - `url_prefix` does not start with `~`
    pub fn new(storage: Arc<dyn RemoteStorage>, options: &ImageProviderOptions) -> Result<Self> {
        let relative = options.url_prefix.strip_prefix('~').ok_or_else(|| {
            Error::InvalidInput(format!(
                "UrlPrefix is not a relative path (~): '{}'",
                options.url_prefix
            ))
        })?;

        let path_prefix = relative.trim_end_matches('/').to_string();
        if !path_prefix.is_empty() && !path_prefix.starts_with('/') {
            return Err(Error::InvalidInput(format!(
                "UrlPrefix must continue with '/' after '~': '{}'",
                options.url_prefix
            )));
        }

        Ok(Self {
            storage,
            path_prefix,
        })
    }

    /// Request path prefix handled by this provider, without trailing `/`.
    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    /// Storage backend images are read from.
    pub fn storage(&self) -> &Arc<dyn RemoteStorage> {
        &self.storage
    }

    /// Whether a request path belongs to this provider.
    pub fn matches(&self, request_path: &str) -> bool {
        strip_path_prefix(request_path, &self.path_prefix).is_some()
    }

    /// Whether the request may be processed. Every request is accepted.
    pub fn is_valid_request(&self, _request_path: &str) -> bool {
        true
    }

    /// Blob name addressed by a request path, if it is under the prefix.
    pub fn file_name(&self, request_path: &str) -> Result<Option<BlobName>> {
        match strip_path_prefix(request_path, &self.path_prefix) {
            Some(rest) => decode_blob_name(rest),
            None => Ok(None),
        }
    }

    /// Look up the image addressed by a request path.
    ///
    /// Returns `None` when the path is outside the prefix, names no file,
    /// or the blob does not exist.
    pub async fn get(&self, request_path: &str) -> Result<Option<ImageResolver>> {
        let Some(name) = self.file_name(request_path)? else {
            return Ok(None);
        };

        match self.storage.metadata(&name).await? {
            Some(properties) => {
                tracing::debug!(blob = %name, "resolved image from storage");
                Ok(Some(ImageResolver::new(
                    Arc::clone(&self.storage),
                    name,
                    properties,
                )))
            }
            None => {
                tracing::debug!(blob = %name, "image not found in storage");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobgate_storage::MemoryStorage;
    use bytes::Bytes;

    fn provider(prefix: &str) -> ImageProvider {
        ImageProvider::new(
            Arc::new(MemoryStorage::new()),
            &ImageProviderOptions {
                url_prefix: prefix.to_string(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_prefix_must_be_relative() {
        let storage: Arc<dyn RemoteStorage> = Arc::new(MemoryStorage::new());
        for prefix in ["/images", "images", ""] {
            let options = ImageProviderOptions {
                url_prefix: prefix.to_string(),
            };
            assert!(ImageProvider::new(Arc::clone(&storage), &options).is_err());
        }

        let options = ImageProviderOptions {
            url_prefix: "~images".to_string(),
        };
        assert!(ImageProvider::new(storage, &options).is_err());
    }

    #[test]
    fn test_prefix_normalization() {
        assert_eq!(provider("~/images").path_prefix(), "/images");
        assert_eq!(provider("~/images/").path_prefix(), "/images");
        assert_eq!(provider("~/").path_prefix(), "");
        assert_eq!(provider("~").path_prefix(), "");
    }

    #[test]
    fn test_matches_on_segment_boundary() {
        let provider = provider("~/images");

        assert!(provider.matches("/images"));
        assert!(provider.matches("/images/cat.png"));
        assert!(provider.matches("/IMAGES/cat.png"));
        assert!(!provider.matches("/imagesx/cat.png"));
        assert!(!provider.matches("/other/cat.png"));
        assert!(!provider.matches("/img"));
    }

    #[test]
    fn test_empty_prefix_matches_everything() {
        let provider = provider("~/");
        assert!(provider.matches("/cat.png"));
        assert!(provider.matches("/"));
    }

    #[test]
    fn test_file_name() {
        let provider = provider("~/images");

        assert_eq!(
            provider.file_name("/images/a/cat.png").unwrap().unwrap().as_str(),
            "a/cat.png"
        );
        assert_eq!(
            provider.file_name("/images/my%20cat.png").unwrap().unwrap().as_str(),
            "my cat.png"
        );
        assert!(provider.file_name("/images").unwrap().is_none());
        assert!(provider.file_name("/images/").unwrap().is_none());
        assert!(provider.file_name("/other/cat.png").unwrap().is_none());
        assert!(provider.file_name("/images/../secret").is_err());
    }

    #[test]
    fn test_every_request_is_valid() {
        assert!(provider("~/images").is_valid_request("/anything"));
    }

    #[tokio::test]
    async fn test_get() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .save(
                &BlobName::parse("cat.png").unwrap(),
                Bytes::from_static(b"png"),
                Some("image/png"),
            )
            .await
            .unwrap();
        let provider = ImageProvider::new(
            storage,
            &ImageProviderOptions {
                url_prefix: "~/images".to_string(),
            },
        )
        .unwrap();

        let resolver = provider.get("/images/cat.png").await.unwrap().unwrap();
        assert_eq!(resolver.name().as_str(), "cat.png");
        assert_eq!(resolver.properties().content_length, 3);

        assert!(provider.get("/images/dog.png").await.unwrap().is_none());
        assert!(provider.get("/images/").await.unwrap().is_none());
        assert!(provider.get("/elsewhere/cat.png").await.unwrap().is_none());
    }
}
