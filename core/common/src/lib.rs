//! Common utilities and types shared across blobgate crates.
//!
//! This module provides the error type and the validated names used to
//! address blobs and containers, independent of any storage backend.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{BlobName, ContainerName, SensitiveBytes};
