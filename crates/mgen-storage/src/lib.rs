//! Project-scoped artifact storage.
//!
//! This crate provides:
//! - The `BlobStore` trait keyed by `(project, asset type, filename)`
//! - Local filesystem storage
//! - Cloudflare R2 storage
//! - Filename generation and content types

pub mod blob;
pub mod client;
pub mod error;
pub mod local;
pub mod naming;

pub use blob::{BlobStore, ObjectInfo, StoredObject};
pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use local::{LocalBlobStore, LocalStorageConfig};
pub use naming::{content_type_for, generate_filename, object_key};
