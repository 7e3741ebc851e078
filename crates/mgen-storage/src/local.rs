//! Filesystem artifact storage.
//!
//! Artifacts live at `{root}/{project_id}/{asset_type}/{filename}` and are
//! served from `{public_prefix}/{project_id}/{asset_type}/{filename}`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use mgen_models::{AssetType, ProjectId};

use crate::blob::{BlobStore, ObjectInfo, StoredObject};
use crate::error::{StorageError, StorageResult};
use crate::naming::{object_key, project_prefix};

/// Configuration for local storage.
#[derive(Debug, Clone)]
pub struct LocalStorageConfig {
    /// Directory holding all projects
    pub root: PathBuf,
    /// URL path the root is served under
    pub public_prefix: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./assets"),
            public_prefix: "/assets".to_string(),
        }
    }
}

impl LocalStorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            root: std::env::var("ASSET_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.root),
            public_prefix: std::env::var("ASSET_PUBLIC_PREFIX").unwrap_or(defaults.public_prefix),
        }
    }
}

/// Artifact storage on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalBlobStore {
    pub fn new(config: LocalStorageConfig) -> Self {
        Self {
            root: config.root,
            public_prefix: config.public_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(
        &self,
        project_id: &ProjectId,
        asset_type: AssetType,
        filename: &str,
    ) -> StorageResult<(String, PathBuf)> {
        let key = object_key(project_id, asset_type, filename)?;
        let path = self.root.join(&key);
        Ok((key, path))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn save(
        &self,
        project_id: &ProjectId,
        asset_type: AssetType,
        filename: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<StoredObject> {
        let (_, path) = self.path_for(project_id, asset_type, filename)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let size = data.len() as u64;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", path.display(), e)))?;

        debug!("Saved {} bytes to {}", size, path.display());
        Ok(StoredObject {
            url: self.public_url(project_id, asset_type, filename),
            path: path.to_string_lossy().into_owned(),
            size,
        })
    }

    async fn get(
        &self,
        project_id: &ProjectId,
        asset_type: AssetType,
        filename: &str,
    ) -> StorageResult<Vec<u8>> {
        let (key, path) = self.path_for(project_id, asset_type, filename)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::not_found(key)),
            Err(e) => Err(StorageError::DownloadFailed(e.to_string())),
        }
    }

    async fn delete(
        &self,
        project_id: &ProjectId,
        asset_type: AssetType,
        filename: &str,
    ) -> StorageResult<bool> {
        let (_, path) = self.path_for(project_id, asset_type, filename)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::delete_failed(e.to_string())),
        }
    }

    async fn exists(
        &self,
        project_id: &ProjectId,
        asset_type: AssetType,
        filename: &str,
    ) -> StorageResult<bool> {
        let (_, path) = self.path_for(project_id, asset_type, filename)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn info(
        &self,
        project_id: &ProjectId,
        asset_type: AssetType,
        filename: &str,
    ) -> StorageResult<Option<ObjectInfo>> {
        let (key, path) = self.path_for(project_id, asset_type, filename)?;
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(ObjectInfo {
            key,
            url: self.public_url(project_id, asset_type, filename),
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        }))
    }

    async fn delete_project(&self, project_id: &ProjectId) -> StorageResult<u64> {
        let dir = self.root.join(project_prefix(project_id)?);
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(0);
        }

        let mut removed = 0u64;
        for asset_type in AssetType::ALL {
            let mut entries = match tokio::fs::read_dir(dir.join(asset_type.as_str())).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    removed += 1;
                }
            }
        }

        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;
        info!(project_id = %project_id, "Deleted {} project files", removed);
        Ok(removed)
    }

    fn public_url(&self, project_id: &ProjectId, asset_type: AssetType, filename: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.public_prefix, project_id, asset_type, filename
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> LocalBlobStore {
        LocalBlobStore::new(LocalStorageConfig {
            root: dir.path().to_path_buf(),
            public_prefix: "/assets/".to_string(),
        })
    }

    #[tokio::test]
    async fn test_save_get_info_delete() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let project = ProjectId::new("p1");

        let stored = store
            .save(&project, AssetType::Videos, "final.mp4", b"abc".to_vec(), "video/mp4")
            .await
            .unwrap();
        assert_eq!(stored.url, "/assets/p1/videos/final.mp4");
        assert_eq!(stored.size, 3);
        assert!(dir.path().join("p1/videos/final.mp4").exists());

        assert!(store.exists(&project, AssetType::Videos, "final.mp4").await.unwrap());
        assert_eq!(
            store.get(&project, AssetType::Videos, "final.mp4").await.unwrap(),
            b"abc"
        );

        let info = store
            .info(&project, AssetType::Videos, "final.mp4")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.key, "p1/videos/final.mp4");
        assert_eq!(info.size, 3);

        assert!(store.delete(&project, AssetType::Videos, "final.mp4").await.unwrap());
        assert!(!store.delete(&project, AssetType::Videos, "final.mp4").await.unwrap());
        assert!(store
            .info(&project, AssetType::Videos, "final.mp4")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = store(&dir)
            .get(&ProjectId::new("p1"), AssetType::Images, "nope.png")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_project() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let project = ProjectId::new("p1");

        for (asset_type, name) in [
            (AssetType::Characters, "hero.png"),
            (AssetType::Videos, "a.mp4"),
            (AssetType::Videos, "b.mp4"),
        ] {
            store
                .save(&project, asset_type, name, vec![1], "application/octet-stream")
                .await
                .unwrap();
        }
        store
            .save(&ProjectId::new("p2"), AssetType::Videos, "keep.mp4", vec![1], "video/mp4")
            .await
            .unwrap();

        assert_eq!(store.delete_project(&project).await.unwrap(), 3);
        assert!(!dir.path().join("p1").exists());
        assert!(dir.path().join("p2/videos/keep.mp4").exists());
        assert_eq!(store.delete_project(&project).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejects_escaping_filename() {
        let dir = TempDir::new().unwrap();
        let result = store(&dir)
            .save(&ProjectId::new("p1"), AssetType::Temp, "../evil", vec![], "text/plain")
            .await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }
}
