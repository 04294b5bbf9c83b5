//! Azure storage account configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use blobgate_common::{ContainerName, Error, Result};

/// Default DNS suffix of the public Azure cloud.
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Account used by the local storage emulator.
const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
/// Well-known key of the local storage emulator.
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
/// Blob endpoint of the local storage emulator.
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

fn default_use_https() -> bool {
    true
}

/// Azure Blob Storage configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct AzureStorageConfig {
    /// Storage account name.
    pub account_name: String,
    /// Base64 encoded account key.
    pub account_key: String,
    /// Container holding the blobs. Empty or absent selects the root container.
    #[serde(default)]
    pub container: Option<String>,
    /// Explicit blob service endpoint (emulators, sovereign clouds).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Use HTTPS when the endpoint is derived from the account name.
    #[serde(default = "default_use_https")]
    pub use_https: bool,
    /// DNS suffix used to derive the endpoint.
    #[serde(default)]
    pub endpoint_suffix: Option<String>,
    /// `Cache-Control` recorded on uploaded blobs.
    #[serde(default)]
    pub default_cache_control: Option<String>,
}

impl AzureStorageConfig {
    /// Create a configuration for the public Azure cloud.
    pub fn new(
        account_name: impl Into<String>,
        account_key: impl Into<String>,
        container: Option<String>,
    ) -> Self {
        Self {
            account_name: account_name.into(),
            account_key: account_key.into(),
            container,
            endpoint: None,
            use_https: true,
            endpoint_suffix: None,
            default_cache_control: None,
        }
    }

    /// Parse an Azure storage connection string.
    ///
    /// Recognised keys: `DefaultEndpointsProtocol`, `AccountName`,
    /// `AccountKey`, `EndpointSuffix`, `BlobEndpoint` and
    /// `UseDevelopmentStorage`. Unknown keys are ignored.
    ///
    /// # Errors
    /// - Malformed `key=value` pair
    /// - Missing account name or key
    pub fn from_connection_string(conn_str: &str) -> Result<Self> {
        let mut account_name = None;
        let mut account_key = None;
        let mut use_https = true;
        let mut endpoint = None;
        let mut endpoint_suffix = None;
        let mut development = false;

        for part in conn_str.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                Error::Configuration(format!("Malformed connection string segment: '{}'", part))
            })?;

            match key.trim().to_ascii_lowercase().as_str() {
                "accountname" => account_name = Some(value.to_string()),
                "accountkey" => account_key = Some(value.to_string()),
                "defaultendpointsprotocol" => use_https = !value.eq_ignore_ascii_case("http"),
                "blobendpoint" => endpoint = Some(value.to_string()),
                "endpointsuffix" => endpoint_suffix = Some(value.to_string()),
                "usedevelopmentstorage" => development = value.eq_ignore_ascii_case("true"),
                other => tracing::debug!(key = other, "ignoring connection string key"),
            }
        }

        if development {
            return Ok(Self {
                account_name: account_name.unwrap_or_else(|| DEV_ACCOUNT_NAME.to_string()),
                account_key: account_key.unwrap_or_else(|| DEV_ACCOUNT_KEY.to_string()),
                container: None,
                endpoint: Some(endpoint.unwrap_or_else(|| DEV_BLOB_ENDPOINT.to_string())),
                use_https: false,
                endpoint_suffix: None,
                default_cache_control: None,
            });
        }

        let account_name = account_name.ok_or_else(|| {
            Error::Configuration("Connection string is missing AccountName".to_string())
        })?;
        let account_key = account_key.ok_or_else(|| {
            Error::Configuration("Connection string is missing AccountKey".to_string())
        })?;

        Ok(Self {
            account_name,
            account_key,
            container: None,
            endpoint,
            use_https,
            endpoint_suffix,
            default_cache_control: None,
        })
    }

    /// Build a configuration from environment variables.
    ///
    /// Reads `AZURE_STORAGE_CONNECTION_STRING`, falling back to
    /// `AZURE_STORAGE_ACCOUNT` + `AZURE_STORAGE_KEY`. The container comes
    /// from `AZURE_STORAGE_CONTAINER` when set.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("AZURE_STORAGE_CONNECTION_STRING") {
            Ok(conn_str) => Self::from_connection_string(&conn_str)?,
            Err(_) => {
                let account = std::env::var("AZURE_STORAGE_ACCOUNT").map_err(|_| {
                    Error::Configuration(
                        "AZURE_STORAGE_CONNECTION_STRING or AZURE_STORAGE_ACCOUNT is not set"
                            .to_string(),
                    )
                })?;
                let key = std::env::var("AZURE_STORAGE_KEY").map_err(|_| {
                    Error::Configuration("AZURE_STORAGE_KEY is not set".to_string())
                })?;
                Self::new(account, key, None)
            }
        };

        if let Ok(container) = std::env::var("AZURE_STORAGE_CONTAINER") {
            config.container = Some(container);
        }

        Ok(config)
    }

    /// Set the container.
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Set the `Cache-Control` recorded on uploads.
    pub fn with_default_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.default_cache_control = Some(cache_control.into());
        self
    }

    /// Resolve the configured container, defaulting to the root container.
    pub fn container_name(&self) -> Result<ContainerName> {
        match self.container.as_deref().map(str::trim) {
            None | Some("") => Ok(ContainerName::root()),
            Some(name) => ContainerName::new(name),
        }
    }

    /// Blob service endpoint for this account.
    pub fn blob_endpoint(&self) -> Result<Url> {
        let raw = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => {
                let scheme = if self.use_https { "https" } else { "http" };
                let suffix = self
                    .endpoint_suffix
                    .as_deref()
                    .unwrap_or(DEFAULT_ENDPOINT_SUFFIX);
                format!("{}://{}.blob.{}", scheme, self.account_name, suffix)
            }
        };

        let url = Url::parse(&raw)
            .map_err(|e| Error::Configuration(format!("Invalid blob endpoint '{}': {}", raw, e)))?;
        if url.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "Blob endpoint is not a base URL: '{}'",
                raw
            )));
        }
        Ok(url)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.account_name.trim().is_empty() {
            return Err(Error::Configuration("Account name is required".to_string()));
        }
        if self.account_key.trim().is_empty() {
            return Err(Error::Configuration("Account key is required".to_string()));
        }
        self.container_name()?;
        self.blob_endpoint()?;
        Ok(())
    }
}

impl fmt::Debug for AzureStorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureStorageConfig")
            .field("account_name", &self.account_name)
            .field("account_key", &"[REDACTED]")
            .field("container", &self.container)
            .field("endpoint", &self.endpoint)
            .field("use_https", &self.use_https)
            .field("endpoint_suffix", &self.endpoint_suffix)
            .field("default_cache_control", &self.default_cache_control)
            .finish()
    }
}
