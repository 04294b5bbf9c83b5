//! HTTP router serving images from remote storage.

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use std::sync::Arc;
use std::time::SystemTime;

use blobgate_common::Error;

use crate::cache_control::format_max_age;
use crate::provider::ImageProvider;
use crate::resolver::ImageMetadata;

#[derive(Clone)]
struct ImageState {
    provider: Arc<ImageProvider>,
}

/// Build a router that serves every path matched by `provider`.
///
/// `GET /health` answers `ok`; every other path is looked up through the
/// provider.
pub fn image_router(provider: Arc<ImageProvider>) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(serve_image)
        .with_state(ImageState { provider })
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn serve_image(
    State(state): State<ImageState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if method != Method::GET && method != Method::HEAD {
        return Err(AppError::MethodNotAllowed);
    }

    let path = uri.path();
    let resolver = state
        .provider
        .get(path)
        .await?
        .ok_or_else(|| AppError::NotFound("image not found".to_string()))?;

    let metadata = resolver.metadata()?;
    let etag = resolver.properties().etag.clone();
    let cache_headers = cache_headers(&metadata, etag.as_deref());

    if is_not_modified(&headers, &metadata, etag.as_deref()) {
        tracing::debug!(path = %path, "image not modified");
        return Ok((StatusCode::NOT_MODIFIED, cache_headers).into_response());
    }

    let mut response_headers = cache_headers;

    if method == Method::HEAD {
        insert_content_headers(
            &mut response_headers,
            metadata.content_type.as_deref(),
            metadata.content_length,
        );
        return Ok((StatusCode::OK, response_headers).into_response());
    }

    tracing::info!(path = %path, blob = %resolver.name(), "serving image from storage");
    let content = resolver.open_content().await?;
    insert_content_headers(
        &mut response_headers,
        content
            .content_type
            .as_deref()
            .or(metadata.content_type.as_deref()),
        content.content_length,
    );

    Ok((StatusCode::OK, response_headers, Body::from_stream(content.stream)).into_response())
}

fn insert_content_headers(headers: &mut HeaderMap, content_type: Option<&str>, length: u64) {
    if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(ct).ok()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
}

fn http_date(time: DateTime<Utc>) -> String {
    httpdate::fmt_http_date(SystemTime::from(time))
}

fn cache_headers(metadata: &ImageMetadata, etag: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Ok(value) = HeaderValue::from_str(&http_date(metadata.last_modified)) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    if let Some(value) = etag.and_then(|etag| HeaderValue::from_str(etag).ok()) {
        headers.insert(header::ETAG, value);
    }
    if let Some(value) = metadata
        .cache_max_age
        .and_then(|max_age| HeaderValue::from_str(&format_max_age(max_age)).ok())
    {
        headers.insert(header::CACHE_CONTROL, value);
    }

    headers
}

/// Strip the weak validator marker from an entity tag.
fn opaque_tag(etag: &str) -> &str {
    etag.strip_prefix("W/").unwrap_or(etag)
}

/// Evaluate `If-None-Match` first, then `If-Modified-Since`.
///
/// `If-None-Match` uses weak comparison.
fn is_not_modified(headers: &HeaderMap, metadata: &ImageMetadata, etag: Option<&str>) -> bool {
    if let Some(if_none_match) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        return match etag {
            Some(etag) => if_none_match
                .split(',')
                .map(str::trim)
                .any(|candidate| candidate == "*" || opaque_tag(candidate) == opaque_tag(etag)),
            None => false,
        };
    }

    headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
        .map(|since| metadata.last_modified.timestamp() <= DateTime::<Utc>::from(since).timestamp())
        .unwrap_or(false)
}

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    MethodNotAllowed,
    StorageUnavailable(String),
    Internal(String),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(msg) => {
                tracing::warn!(error = %msg, "invalid image request");
                AppError::BadRequest(msg)
            }
            Error::NotFound(msg) => AppError::NotFound(msg),
            Error::Network(msg)
            | Error::Authentication(msg)
            | Error::PermissionDenied(msg)
            | Error::Storage(msg) => AppError::StorageUnavailable(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "method not allowed".to_string(),
            ),
            AppError::StorageUnavailable(msg) => {
                tracing::error!(error = %msg, "storage unavailable");
                (StatusCode::BAD_GATEWAY, "storage unavailable".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}
