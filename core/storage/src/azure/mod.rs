//! Azure Blob Storage backend for blobgate.
//!
//! This module talks to the Blob service REST API directly:
//! - Shared Key request signing
//! - Put Blob, Delete Blob, Get Blob and Get Blob Properties
//! - Connection-string and environment based configuration
//! - Full RemoteStorage trait implementation

pub mod auth;
pub mod client;
pub mod config;
pub mod provider;

pub use auth::SharedKeyCredential;
pub use client::BlobClient;
pub use config::AzureStorageConfig;
pub use provider::{create_azure_storage, AzureRemoteStorage};

/// REST API version sent with every request.
pub const API_VERSION: &str = "2021-08-06";
