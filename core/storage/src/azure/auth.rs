//! Shared Key authorization for the Blob service.
//!
//! Every request is signed with HMAC-SHA256 over a canonical
//! string-to-sign:
//!
//! ```text
//! VERB\n
//! Content-Encoding\n
//! Content-Language\n
//! Content-Length\n
//! Content-MD5\n
//! Content-Type\n
//! Date\n
//! If-Modified-Since\n
//! If-Match\n
//! If-None-Match\n
//! If-Unmodified-Since\n
//! Range\n
//! CanonicalizedHeaders
//! CanonicalizedResource
//! ```

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::header::{self, HeaderMap, HeaderName};
use reqwest::{Method, Request};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

use blobgate_common::{Error, Result, SensitiveBytes};

type HmacSha256 = Hmac<Sha256>;

/// Account name and decoded key used to sign requests.
#[derive(Clone)]
pub struct SharedKeyCredential {
    account: String,
    key: SensitiveBytes,
}

impl SharedKeyCredential {
    /// Create a credential from a base64 encoded account key.
    ///
    /// # Errors
    /// - Key is not valid base64
    pub fn new(account: impl Into<String>, account_key: &str) -> Result<Self> {
        let key = BASE64_STANDARD
            .decode(account_key.trim())
            .map_err(|e| Error::Configuration(format!("Account key is not valid base64: {}", e)))?;

        Ok(Self {
            account: account.into(),
            key: SensitiveBytes::new(key),
        })
    }

    /// Storage account name.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Compute the `Authorization` header value for a built request.
    ///
    /// All `x-ms-*` headers, including `x-ms-date`, must already be set.
    pub fn sign(&self, request: &Request) -> Result<String> {
        let content_length = request
            .body()
            .and_then(|body| body.as_bytes())
            .map(|bytes| bytes.len())
            .unwrap_or(0);

        let string_to_sign = string_to_sign(
            &self.account,
            request.method(),
            request.url(),
            request.headers(),
            content_length,
        );

        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .map_err(|e| Error::Authentication(format!("HMAC key error: {}", e)))?;
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        Ok(format!("SharedKey {}:{}", self.account, signature))
    }
}

impl fmt::Debug for SharedKeyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKeyCredential")
            .field("account", &self.account)
            .field("key", &self.key)
            .finish()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Build the Shared Key string-to-sign for a request.
pub(crate) fn string_to_sign(
    account: &str,
    method: &Method,
    url: &Url,
    headers: &HeaderMap,
    content_length: usize,
) -> String {
    // Zero length is signed as an empty string.
    let content_length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    format!(
        "{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}{}",
        method.as_str(),
        header_str(headers, &header::CONTENT_ENCODING),
        header_str(headers, &header::CONTENT_LANGUAGE),
        content_length,
        header_str(headers, &HeaderName::from_static("content-md5")),
        header_str(headers, &header::CONTENT_TYPE),
        header_str(headers, &header::DATE),
        header_str(headers, &header::IF_MODIFIED_SINCE),
        header_str(headers, &header::IF_MATCH),
        header_str(headers, &header::IF_NONE_MATCH),
        header_str(headers, &header::IF_UNMODIFIED_SINCE),
        header_str(headers, &header::RANGE),
        canonicalized_headers(headers),
        canonicalized_resource(account, url),
    )
}

/// `x-ms-*` headers, sorted by name, one `name:value\n` line each.
fn canonicalized_headers(headers: &HeaderMap) -> String {
    let mut ms_headers: Vec<(&str, &str)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .map(|(name, value)| (name.as_str(), value.to_str().unwrap_or("").trim()))
        .collect();
    ms_headers.sort_by(|a, b| a.0.cmp(b.0));

    ms_headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect()
}

/// `/{account}{path}` followed by sorted query parameters.
fn canonicalized_resource(account: &str, url: &Url) -> String {
    let mut resource = format!("/{}{}", account, url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in url.query_pairs() {
        params
            .entry(key.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }

    for (key, mut values) in params {
        values.sort();
        resource.push_str(&format!("\n{}:{}", key, values.join(",")));
    }

    resource
}
