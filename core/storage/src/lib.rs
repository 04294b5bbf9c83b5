//! Remote storage abstraction for blobgate.
//!
//! This module provides a trait-based interface over blob backends
//! (Azure Blob Storage, local filesystem, memory) and a registry for
//! resolving a backend by name and JSON configuration.
//!
//! # Design Principles
//! - Backend isolation: callers only see `RemoteStorage` and its DTOs
//! - Async operations: All I/O operations are async
//! - Streaming support: Blob content is returned as a byte stream
//! - Unified error semantics: Backend failures map onto `blobgate_common::Error`

pub mod azure;
pub mod local;
pub mod memory;
pub mod provider;
pub mod registry;

pub use azure::{AzureRemoteStorage, AzureStorageConfig};
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use provider::{BlobProperties, ByteStream, FileStorageResponse, RemoteStorage};
pub use registry::{create_default_registry, StorageFactory, StorageRegistry};
