//! R2 client implementation.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use mgen_models::{AssetType, ProjectId};

use crate::blob::{BlobStore, ObjectInfo, StoredObject};
use crate::error::{StorageError, StorageResult};
use crate::naming::{object_key, project_prefix};

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
    /// Base URL the bucket is publicly served from
    pub public_base_url: String,
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let endpoint_url = std::env::var("R2_ENDPOINT_URL")
            .map_err(|_| StorageError::config_error("R2_ENDPOINT_URL not set"))?;
        let bucket_name = std::env::var("R2_BUCKET_NAME")
            .map_err(|_| StorageError::config_error("R2_BUCKET_NAME not set"))?;
        let public_base_url = std::env::var("R2_PUBLIC_URL")
            .unwrap_or_else(|_| format!("{}/{}", endpoint_url.trim_end_matches('/'), bucket_name));

        Ok(Self {
            access_key_id: std::env::var("R2_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("R2_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("R2_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("R2_SECRET_ACCESS_KEY not set"))?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
            endpoint_url,
            bucket_name,
            public_base_url,
        })
    }

    /// Whether R2 credentials are present in the environment.
    pub fn is_configured() -> bool {
        ["R2_ENDPOINT_URL", "R2_ACCESS_KEY_ID", "R2_SECRET_ACCESS_KEY", "R2_BUCKET_NAME"]
            .iter()
            .all(|key| std::env::var(key).is_ok())
    }
}

/// Cloudflare R2 storage client.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl R2Client {
    /// Create a new R2 client from configuration.
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(R2Config::from_env()?))
    }

    /// Upload bytes to R2.
    pub async fn upload_bytes(
        &self,
        data: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        debug!("Uploading {} bytes to {}", data.len(), key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        Ok(())
    }

    /// Download object as bytes.
    pub async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        debug!("Downloading {}", key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(key)
                } else {
                    StorageError::DownloadFailed(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    /// Head an object; `None` when it does not exist.
    pub async fn head(&self, key: &str) -> StorageResult<Option<(u64, Option<DateTime<Utc>>)>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => {
                let size = output.content_length().unwrap_or(0).max(0) as u64;
                let last_modified = output
                    .last_modified()
                    .and_then(|t| t.to_millis().ok())
                    .and_then(DateTime::<Utc>::from_timestamp_millis);
                Ok(Some((size, last_modified)))
            }
            Err(e) => {
                if e.to_string().contains("NotFound") || e.to_string().contains("NoSuchKey") {
                    Ok(None)
                } else {
                    Err(StorageError::AwsSdk(e.to_string()))
                }
            }
        }
    }

    /// Delete an object.
    pub async fn delete_object(&self, key: &str) -> StorageResult<()> {
        debug!("Deleting {}", key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        Ok(())
    }

    /// Delete multiple objects.
    pub async fn delete_objects(&self, keys: &[String]) -> StorageResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        debug!("Deleting {} objects", keys.len());

        let objects = keys
            .iter()
            .map(|k| {
                aws_sdk_s3::types::ObjectIdentifier::builder()
                    .key(k)
                    .build()
                    .map_err(|e| StorageError::invalid_key(e.to_string()))
            })
            .collect::<StorageResult<Vec<_>>>()?;

        let delete = aws_sdk_s3::types::Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        self.client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        info!("Deleted {} objects", keys.len());
        Ok(keys.len() as u64)
    }

    /// List object keys with a prefix.
    pub async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        debug!("Listing objects with prefix: {}", prefix);

        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StorageError::ListFailed(e.to_string()))?;

            keys.extend(response.contents().iter().filter_map(|obj| obj.key.clone()));

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(keys)
    }

    /// Check connectivity to R2 by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("R2 connectivity check failed: {}", e)))?;
        Ok(())
    }

    fn url_for_key(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

#[async_trait]
impl BlobStore for R2Client {
    async fn save(
        &self,
        project_id: &ProjectId,
        asset_type: AssetType,
        filename: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<StoredObject> {
        let key = object_key(project_id, asset_type, filename)?;
        let size = data.len() as u64;
        self.upload_bytes(data, &key, content_type).await?;

        info!(project_id = %project_id, "Uploaded {} ({} bytes)", key, size);
        Ok(StoredObject {
            url: self.url_for_key(&key),
            path: key,
            size,
        })
    }

    async fn get(
        &self,
        project_id: &ProjectId,
        asset_type: AssetType,
        filename: &str,
    ) -> StorageResult<Vec<u8>> {
        self.download_bytes(&object_key(project_id, asset_type, filename)?)
            .await
    }

    async fn delete(
        &self,
        project_id: &ProjectId,
        asset_type: AssetType,
        filename: &str,
    ) -> StorageResult<bool> {
        let key = object_key(project_id, asset_type, filename)?;
        if self.head(&key).await?.is_none() {
            return Ok(false);
        }
        self.delete_object(&key).await?;
        Ok(true)
    }

    async fn exists(
        &self,
        project_id: &ProjectId,
        asset_type: AssetType,
        filename: &str,
    ) -> StorageResult<bool> {
        let key = object_key(project_id, asset_type, filename)?;
        Ok(self.head(&key).await?.is_some())
    }

    async fn info(
        &self,
        project_id: &ProjectId,
        asset_type: AssetType,
        filename: &str,
    ) -> StorageResult<Option<ObjectInfo>> {
        let key = object_key(project_id, asset_type, filename)?;
        Ok(self.head(&key).await?.map(|(size, last_modified)| ObjectInfo {
            url: self.url_for_key(&key),
            key: key.clone(),
            size,
            last_modified,
        }))
    }

    async fn delete_project(&self, project_id: &ProjectId) -> StorageResult<u64> {
        let keys = self.list_keys(&project_prefix(project_id)?).await?;
        let mut removed = 0;
        // DeleteObjects accepts at most 1000 keys per request
        for chunk in keys.chunks(1000) {
            removed += self.delete_objects(chunk).await?;
        }
        Ok(removed)
    }

    fn public_url(&self, project_id: &ProjectId, asset_type: AssetType, filename: &str) -> String {
        self.url_for_key(&format!("{}/{}/{}", project_id, asset_type, filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn client() -> R2Client {
        R2Client::new(R2Config {
            endpoint_url: "https://account.r2.cloudflarestorage.com".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            bucket_name: "media".to_string(),
            region: "auto".to_string(),
            public_base_url: "https://cdn.example.com/".to_string(),
        })
    }

    #[test]
    fn test_public_url() {
        let url = client().public_url(&ProjectId::new("p1"), AssetType::Videos, "final.mp4");
        assert_eq!(url, "https://cdn.example.com/p1/videos/final.mp4");
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults_public_url() {
        std::env::set_var("R2_ENDPOINT_URL", "https://r2.example.com/");
        std::env::set_var("R2_ACCESS_KEY_ID", "id");
        std::env::set_var("R2_SECRET_ACCESS_KEY", "secret");
        std::env::set_var("R2_BUCKET_NAME", "bucket");
        std::env::remove_var("R2_PUBLIC_URL");

        assert!(R2Config::is_configured());
        let config = R2Config::from_env().unwrap();
        assert_eq!(config.public_base_url, "https://r2.example.com/bucket");
        assert_eq!(config.region, "auto");

        for key in ["R2_ENDPOINT_URL", "R2_ACCESS_KEY_ID", "R2_SECRET_ACCESS_KEY", "R2_BUCKET_NAME"] {
            std::env::remove_var(key);
        }
        assert!(R2Config::from_env().is_err());
    }
}
