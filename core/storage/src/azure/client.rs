//! Azure Blob service REST client.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::time::{Duration, SystemTime};
use url::Url;

use blobgate_common::{BlobName, ContainerName, Error, Result};

use super::auth::SharedKeyCredential;
use super::config::AzureStorageConfig;
use super::API_VERSION;
use crate::provider::{BlobProperties, ByteStream};

/// Timeout applied to every request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Client for one container of a storage account.
#[derive(Clone)]
pub struct BlobClient {
    http: Client,
    endpoint: Url,
    container: ContainerName,
    credential: SharedKeyCredential,
}

impl BlobClient {
    /// Create a client from a configuration.
    ///
    /// # Errors
    /// - Invalid configuration (key, container, endpoint)
    /// - HTTP client construction failure
    pub fn new(config: &AzureStorageConfig) -> Result<Self> {
        config.validate()?;

        let http = Client::builder()
            .user_agent(concat!("blobgate/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: config.blob_endpoint()?,
            container: config.container_name()?,
            credential: SharedKeyCredential::new(&config.account_name, &config.account_key)?,
        })
    }

    /// Container this client operates on.
    pub fn container(&self) -> &ContainerName {
        &self.container
    }

    /// Client for another container of the same account.
    ///
    /// The HTTP connection pool and credential are shared with `self`.
    pub fn with_container(&self, container: ContainerName) -> Self {
        Self {
            http: self.http.clone(),
            endpoint: self.endpoint.clone(),
            container,
            credential: self.credential.clone(),
        }
    }

    /// Full URL of a blob.
    pub fn blob_url(&self, name: &BlobName) -> Result<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                Error::Configuration(format!("Endpoint is not a base URL: {}", self.endpoint))
            })?;
            segments.pop_if_empty();
            segments.push(self.container.as_str());
            segments.extend(name.segments());
        }
        Ok(url)
    }

    /// Sign and send a request.
    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let mut request = builder
            .header("x-ms-date", httpdate::fmt_http_date(SystemTime::now()))
            .header("x-ms-version", API_VERSION)
            .build()
            .map_err(|e| Error::Network(format!("Failed to build request: {}", e)))?;

        let authorization = self.credential.sign(&request)?;
        request.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&authorization)
                .map_err(|e| Error::Authentication(format!("Invalid signature header: {}", e)))?,
        );

        let method = request.method().clone();
        let url = request.url().clone();
        tracing::debug!(%method, %url, "sending blob request");

        self.http
            .execute(request)
            .await
            .map_err(|e| Error::Network(format!("{} {} failed: {}", method, url, e)))
    }

    /// Upload a block blob in a single Put Blob call.
    pub async fn put_blob(
        &self,
        name: &BlobName,
        data: Bytes,
        content_type: Option<&str>,
        cache_control: Option<&str>,
    ) -> Result<()> {
        let url = self.blob_url(name)?;
        let len = data.len();

        let mut builder = self
            .http
            .request(Method::PUT, url)
            .header("x-ms-blob-type", "BlockBlob")
            .header(header::CONTENT_LENGTH, len.to_string())
            .body(data);
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        if let Some(cache_control) = cache_control {
            builder = builder.header("x-ms-blob-cache-control", cache_control);
        }

        let response = self.send(builder).await?;
        handle_status(response, name).await?;

        tracing::info!(blob = %name, bytes = len, "uploaded blob");
        Ok(())
    }

    /// Delete a blob and its snapshots.
    ///
    /// Returns `false` when the blob did not exist.
    pub async fn delete_blob(&self, name: &BlobName) -> Result<bool> {
        let url = self.blob_url(name)?;
        let builder = self
            .http
            .request(Method::DELETE, url)
            .header("x-ms-delete-snapshots", "include");

        let response = self.send(builder).await?;
        match handle_status(response, name).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fetch blob properties with a HEAD request.
    pub async fn get_properties(&self, name: &BlobName) -> Result<BlobProperties> {
        let url = self.blob_url(name)?;
        let response = self.send(self.http.request(Method::HEAD, url)).await?;
        let response = handle_status(response, name).await?;

        Ok(properties_from_headers(name, response.headers()))
    }

    /// Download a blob as a stream together with its properties.
    pub async fn get_blob(&self, name: &BlobName) -> Result<(BlobProperties, ByteStream)> {
        let url = self.blob_url(name)?;
        let response = self.send(self.http.request(Method::GET, url)).await?;
        let response = handle_status(response, name).await?;

        let properties = properties_from_headers(name, response.headers());
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Error::Network(format!("Stream read error: {}", e))));

        Ok((properties, Box::pin(stream)))
    }
}

/// Map a non-success status to the matching error.
async fn handle_status(response: Response, name: &BlobName) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_code = response
        .headers()
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    match status {
        StatusCode::NOT_FOUND => Err(Error::NotFound(format!("Blob not found: {}", name))),
        StatusCode::UNAUTHORIZED => Err(Error::Authentication(format!(
            "Request for {} was not authorized {}",
            name, error_code
        ))),
        StatusCode::FORBIDDEN => {
            tracing::error!(blob = %name, code = %error_code, "blob access denied");
            Err(Error::PermissionDenied(format!(
                "Access to {} denied {}",
                name, error_code
            )))
        }
        _ => {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(blob = %name, %status, code = %error_code, "unexpected blob service response");
            Err(Error::Network(format!("Blob service error: {} - {}", status, body)))
        }
    }
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Build blob properties from Get Blob / Get Blob Properties headers.
fn properties_from_headers(name: &BlobName, headers: &HeaderMap) -> BlobProperties {
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let last_modified = headers
        .get(header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
        .map(DateTime::<Utc>::from);

    BlobProperties {
        name: name.to_string(),
        content_length,
        content_type: header_string(headers, header::CONTENT_TYPE),
        cache_control: header_string(headers, header::CACHE_CONTROL),
        last_modified,
        etag: header_string(headers, header::ETAG),
    }
}
