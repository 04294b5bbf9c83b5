//! Common error types for blobgate.

use thiserror::Error;

/// Top-level error type for blobgate operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage backend reported a failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Transport failure or unexpected remote response.
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials were rejected.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Access to the resource was denied.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Backend configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Whether this error means the addressed object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(Error::NotFound("x".to_string()).is_not_found());
        assert!(!Error::Network("x".to_string()).is_not_found());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
