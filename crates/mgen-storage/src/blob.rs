//! Storage-agnostic artifact access.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mgen_models::{AssetType, ProjectId};

use crate::error::StorageResult;

/// Result of persisting an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Public URL of the artifact
    pub url: String,
    /// Storage key or path
    pub path: String,
    /// Size in bytes
    pub size: u64,
}

/// Metadata about a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub url: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Project-scoped artifact storage keyed by `(project, asset type, filename)`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist bytes, creating any missing directory or prefix.
    async fn save(
        &self,
        project_id: &ProjectId,
        asset_type: AssetType,
        filename: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<StoredObject>;

    async fn get(
        &self,
        project_id: &ProjectId,
        asset_type: AssetType,
        filename: &str,
    ) -> StorageResult<Vec<u8>>;

    /// Delete an artifact. Returns false if it did not exist.
    async fn delete(
        &self,
        project_id: &ProjectId,
        asset_type: AssetType,
        filename: &str,
    ) -> StorageResult<bool>;

    async fn exists(
        &self,
        project_id: &ProjectId,
        asset_type: AssetType,
        filename: &str,
    ) -> StorageResult<bool>;

    /// Metadata, or `None` if the artifact does not exist.
    async fn info(
        &self,
        project_id: &ProjectId,
        asset_type: AssetType,
        filename: &str,
    ) -> StorageResult<Option<ObjectInfo>>;

    /// Remove every artifact of a project. Returns the number removed.
    async fn delete_project(&self, project_id: &ProjectId) -> StorageResult<u64>;

    /// Public URL an artifact is (or would be) served from.
    fn public_url(&self, project_id: &ProjectId, asset_type: AssetType, filename: &str) -> String;
}
