//! Image serving on top of blobgate remote storage.
//!
//! Provides the pieces an image-processing HTTP pipeline needs to read
//! source images out of blob storage:
//! - [`ImageProvider`] decides whether a request path belongs to storage
//!   and hands out an [`ImageResolver`]
//! - [`ImageResolver`] exposes cache metadata and the image byte stream
//! - [`AzureReader`] maps virtual paths under a prefix onto blobs and
//!   rewrites query strings of unprocessed requests
//! - [`image_router`] serves images over HTTP with conditional GET support

pub mod cache_control;
pub mod provider;
pub mod reader;
pub mod resolver;
pub mod server;

pub use cache_control::{format_max_age, parse_max_age};
pub use provider::{ImageProvider, ImageProviderOptions};
pub use reader::{AzureReader, QueryString, ReaderSettings};
pub use resolver::{ImageMetadata, ImageResolver};
pub use server::image_router;
