//! Job status persistence and the status tracker.
//!
//! A job has exactly one owner while it is processed, so every write is a
//! read-modify-write of a single record with no cross-job locking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use mgen_models::{JobId, JobStatusRecord, StatusUpdate};

use crate::error::{QueueError, QueueResult};

/// Storage for job status records.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn load(&self, job_id: &JobId) -> QueueResult<Option<JobStatusRecord>>;

    async fn save(&self, record: &JobStatusRecord) -> QueueResult<()>;
}

/// Status records as JSON strings in Redis, expiring after a TTL.
pub struct RedisStatusStore {
    conn: MultiplexedConnection,
    key_prefix: String,
    ttl: Duration,
}

impl RedisStatusStore {
    pub fn new(conn: MultiplexedConnection, key_prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
            ttl,
        }
    }

    fn key(&self, job_id: &JobId) -> String {
        format!("{}:status:{}", self.key_prefix, job_id)
    }
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn load(&self, job_id: &JobId) -> QueueResult<Option<JobStatusRecord>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.key(job_id)).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(QueueError::from))
            .transpose()
    }

    async fn save(&self, record: &JobStatusRecord) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(self.key(&record.job_id), payload, self.ttl.as_secs().max(1))
            .await?;
        Ok(())
    }
}

/// Status records held in process memory.
#[derive(Default)]
pub struct InMemoryStatusStore {
    records: RwLock<HashMap<JobId, JobStatusRecord>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn load(&self, job_id: &JobId) -> QueueResult<Option<JobStatusRecord>> {
        Ok(self.records.read().await.get(job_id).cloned())
    }

    async fn save(&self, record: &JobStatusRecord) -> QueueResult<()> {
        self.records
            .write()
            .await
            .insert(record.job_id.clone(), record.clone());
        Ok(())
    }
}

/// Applies status transitions on top of a [`StatusStore`].
///
/// Rejects writes to terminal records and never lowers progress.
#[derive(Clone)]
pub struct JobStatusTracker {
    store: Arc<dyn StatusStore>,
}

impl JobStatusTracker {
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        Self { store }
    }

    /// Persist a freshly created record.
    pub async fn create(&self, record: &JobStatusRecord) -> QueueResult<()> {
        self.store.save(record).await?;
        debug!(job_id = %record.job_id, job_type = %record.job_type, "Created status record");
        Ok(())
    }

    /// Apply a transition and return the stored record.
    pub async fn update_job_status(
        &self,
        job_id: &JobId,
        update: StatusUpdate,
    ) -> QueueResult<JobStatusRecord> {
        let mut record = self
            .store
            .load(job_id)
            .await?
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;

        let requested = update.status;
        if let Err(e) = record.apply(update) {
            warn!(job_id = %job_id, status = %requested, "Rejected status update: {}", e);
            return Err(e.into());
        }

        self.store.save(&record).await?;
        debug!(
            job_id = %job_id,
            status = %record.status,
            progress = record.progress,
            "Updated job status"
        );
        Ok(record)
    }

    pub async fn get_job_status(&self, job_id: &JobId) -> QueueResult<Option<JobStatusRecord>> {
        self.store.load(job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgen_models::{JobStatus, JobType, ProjectId};

    fn tracker() -> JobStatusTracker {
        JobStatusTracker::new(Arc::new(InMemoryStatusStore::new()))
    }

    async fn created(tracker: &JobStatusTracker) -> JobId {
        let record = JobStatusRecord::new(
            JobId::new(),
            JobType::ImageEdit,
            ProjectId::new("p1"),
        );
        tracker.create(&record).await.unwrap();
        record.job_id
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let tracker = tracker();
        let job_id = created(&tracker).await;

        tracker
            .update_job_status(&job_id, StatusUpdate::progress(30))
            .await
            .unwrap();
        let record = tracker
            .update_job_status(&job_id, StatusUpdate::progress(10))
            .await
            .unwrap();
        assert_eq!(record.progress, 30);
        assert_eq!(record.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_terminal_record_is_final() {
        let tracker = tracker();
        let job_id = created(&tracker).await;

        tracker
            .update_job_status(&job_id, StatusUpdate::completed(serde_json::json!({"url": "u"})))
            .await
            .unwrap();
        let err = tracker
            .update_job_status(&job_id, StatusUpdate::failed("late"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Transition(_)));

        let record = tracker.get_job_status(&job_id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.progress, 100);
        assert!(record.error_message.is_none());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let tracker = tracker();
        let err = tracker
            .update_job_status(&JobId::new(), StatusUpdate::progress(10))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::JobNotFound(_)));
        assert!(tracker.get_job_status(&JobId::new()).await.unwrap().is_none());
    }
}
