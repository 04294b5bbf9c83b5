//! Azure Blob Storage backend implementation.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;

use blobgate_common::{BlobName, ContainerName, Error, Result};

use super::client::BlobClient;
use super::config::AzureStorageConfig;
use crate::provider::{
    effective_content_type, BlobProperties, FileStorageResponse, RemoteStorage,
};

/// Azure Blob Storage backend.
///
/// Implements the RemoteStorage trait for one container of a storage account.
#[derive(Clone)]
pub struct AzureRemoteStorage {
    client: BlobClient,
    default_cache_control: Option<String>,
}

impl AzureRemoteStorage {
    /// Create a new Azure backend.
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: AzureStorageConfig) -> Result<Self> {
        let client = BlobClient::new(&config)?;

        tracing::info!(
            account = %config.account_name,
            container = %client.container(),
            "azure remote storage initialized"
        );

        Ok(Self {
            client,
            default_cache_control: config.default_cache_control,
        })
    }

    /// Backend for another container of the same account.
    ///
    /// Shares the HTTP client, so switching containers opens no new
    /// connection pool.
    pub fn with_container(&self, container: ContainerName) -> Self {
        Self {
            client: self.client.with_container(container),
            default_cache_control: self.default_cache_control.clone(),
        }
    }

    /// Underlying REST client.
    pub fn client(&self) -> &BlobClient {
        &self.client
    }
}

#[async_trait]
impl RemoteStorage for AzureRemoteStorage {
    fn name(&self) -> &str {
        "azure"
    }

    async fn save(&self, name: &BlobName, data: Bytes, content_type: Option<&str>) -> Result<()> {
        self.client
            .put_blob(
                name,
                data,
                effective_content_type(content_type),
                self.default_cache_control.as_deref(),
            )
            .await
    }

    async fn delete(&self, name: &BlobName) -> Result<()> {
        if !self.client.delete_blob(name).await? {
            tracing::debug!(blob = %name, "delete skipped, blob does not exist");
        }
        Ok(())
    }

    async fn get_content(&self, name: &BlobName) -> Result<FileStorageResponse> {
        let (properties, stream) = self.client.get_blob(name).await?;

        Ok(FileStorageResponse {
            file_name: name.to_string(),
            content_length: properties.content_length,
            content_type: properties.content_type,
            stream,
        })
    }

    async fn exists(&self, name: &BlobName) -> Result<bool> {
        match self.client.get_properties(name).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn metadata(&self, name: &BlobName) -> Result<Option<BlobProperties>> {
        match self.client.get_properties(name).await {
            Ok(properties) => Ok(Some(properties)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn partial_file_path(&self, name: &BlobName) -> String {
        let container = self.client.container();
        if container.is_root() {
            name.to_string()
        } else {
            format!("{}/{}", container, name)
        }
    }
}

/// Create an Azure backend from a JSON configuration.
///
/// Accepts either the fields of [`AzureStorageConfig`] or a
/// `connection_string`, optionally together with `container` and
/// `default_cache_control`.
pub fn create_azure_storage(config: Value) -> Result<Arc<dyn RemoteStorage>> {
    let azure_config = match config.get("connection_string").and_then(Value::as_str) {
        Some(conn_str) => {
            let mut azure_config = AzureStorageConfig::from_connection_string(conn_str)?;
            if let Some(container) = config.get("container").and_then(Value::as_str) {
                azure_config.container = Some(container.to_string());
            }
            if let Some(cache_control) = config.get("default_cache_control").and_then(Value::as_str)
            {
                azure_config.default_cache_control = Some(cache_control.to_string());
            }
            azure_config
        }
        None => serde_json::from_value(config)
            .map_err(|e| Error::Configuration(format!("Invalid azure configuration: {}", e)))?,
    };

    Ok(Arc::new(AzureRemoteStorage::new(azure_config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, header_exists, headers, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn storage(mock_server: &MockServer, container: &str) -> AzureRemoteStorage {
        let mut config = AzureStorageConfig::new("devstoreaccount1", "a2V5a2V5", Some(container.to_string()));
        config.endpoint = Some(format!("{}/devstoreaccount1", mock_server.uri()));
        AzureRemoteStorage::new(config).unwrap()
    }

    fn blob(name: &str) -> BlobName {
        BlobName::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_save_puts_block_blob() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/devstoreaccount1/images/cat.png"))
            .and(header("x-ms-blob-type", "BlockBlob"))
            .and(header("content-type", "image/png"))
            .and(header_exists("authorization"))
            .and(header_exists("x-ms-date"))
            .and(body_bytes(b"png-bytes".to_vec()))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&mock_server)
            .await;

        storage(&mock_server, "images")
            .save(&blob("cat.png"), Bytes::from_static(b"png-bytes"), Some("image/png"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_save_sends_default_cache_control() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/devstoreaccount1/images/cat.png"))
            .and(headers("x-ms-blob-cache-control", vec!["public", "max-age=86400"]))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut config = AzureStorageConfig::new("devstoreaccount1", "a2V5a2V5", Some("images".to_string()))
            .with_default_cache_control("public, max-age=86400");
        config.endpoint = Some(format!("{}/devstoreaccount1", mock_server.uri()));

        AzureRemoteStorage::new(config)
            .unwrap()
            .save(&blob("cat.png"), Bytes::from_static(b"x"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_missing_blob_succeeds() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/devstoreaccount1/images/missing.png"))
            .respond_with(ResponseTemplate::new(404).insert_header("x-ms-error-code", "BlobNotFound"))
            .expect(1)
            .mount(&mock_server)
            .await;

        storage(&mock_server, "images")
            .delete(&blob("missing.png"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_existing_blob() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/devstoreaccount1/images/cat.png"))
            .and(header("x-ms-delete-snapshots", "include"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&mock_server)
            .await;

        storage(&mock_server, "images")
            .delete(&blob("cat.png"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_exists() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/devstoreaccount1/images/cat.png"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/devstoreaccount1/images/dog.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let storage = storage(&mock_server, "images");
        assert!(storage.exists(&blob("cat.png")).await.unwrap());
        assert!(!storage.exists(&blob("dog.png")).await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_propagates_other_failures() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/devstoreaccount1/images/cat.png"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let result = storage(&mock_server, "images").exists(&blob("cat.png")).await;
        assert!(matches!(result, Err(Error::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_authentication() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/devstoreaccount1/images/cat.png"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let result = storage(&mock_server, "images").metadata(&blob("cat.png")).await;
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[tokio::test]
    async fn test_metadata() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/devstoreaccount1/images/cat.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .insert_header("cache-control", "public, max-age=3600")
                    .insert_header("last-modified", "Mon, 01 Jan 2024 00:00:00 GMT")
                    .insert_header("etag", "\"0x8DC1\""),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/devstoreaccount1/images/none.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let storage = storage(&mock_server, "images");
        let props = storage.metadata(&blob("cat.png")).await.unwrap().unwrap();

        assert_eq!(props.name, "cat.png");
        assert_eq!(props.content_type.as_deref(), Some("image/png"));
        assert_eq!(props.cache_control.as_deref(), Some("public, max-age=3600"));
        assert_eq!(props.last_modified.unwrap().timestamp(), 1_704_067_200);
        assert_eq!(props.etag.as_deref(), Some("\"0x8DC1\""));

        assert!(storage.metadata(&blob("none.png")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_content() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/devstoreaccount1/images/cat.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(b"meow".to_vec()),
            )
            .mount(&mock_server)
            .await;

        let response = storage(&mock_server, "images")
            .get_content(&blob("cat.png"))
            .await
            .unwrap();

        assert_eq!(response.file_name, "cat.png");
        assert_eq!(response.content_length, 4);
        assert_eq!(response.content_type.as_deref(), Some("image/png"));
        assert_eq!(response.into_bytes().await.unwrap(), Bytes::from_static(b"meow"));
    }

    #[tokio::test]
    async fn test_get_content_missing() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/devstoreaccount1/images/cat.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let err = storage(&mock_server, "images")
            .get_content(&blob("cat.png"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_server_error_maps_to_network() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/devstoreaccount1/images/cat.png"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let err = storage(&mock_server, "images")
            .save(&blob("cat.png"), Bytes::from_static(b"x"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(msg) if msg.contains("boom")));
    }

    #[test]
    fn test_partial_file_path() {
        let config = AzureStorageConfig::new("acc", "a2V5", Some("images".to_string()));
        let storage = AzureRemoteStorage::new(config).unwrap();
        assert_eq!(storage.partial_file_path(&blob("a/b.png")), "images/a/b.png");

        let root = AzureRemoteStorage::new(AzureStorageConfig::new("acc", "a2V5", None)).unwrap();
        assert_eq!(root.partial_file_path(&blob("a/b.png")), "a/b.png");
    }

    #[test]
    fn test_create_from_json() {
        let storage = create_azure_storage(serde_json::json!({
            "account_name": "acc",
            "account_key": "a2V5",
            "container": "images"
        }))
        .unwrap();
        assert_eq!(storage.name(), "azure");
        assert_eq!(storage.partial_file_path(&blob("x.png")), "images/x.png");

        let from_conn = create_azure_storage(serde_json::json!({
            "connection_string": "AccountName=acc;AccountKey=a2V5",
            "container": "photos"
        }))
        .unwrap();
        assert_eq!(from_conn.partial_file_path(&blob("x.png")), "photos/x.png");

        assert!(create_azure_storage(serde_json::json!({ "account_name": "acc" })).is_err());
    }
}
