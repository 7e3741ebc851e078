//! Queue manager: one queue per job type over a shared broker.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use mgen_models::{JobId, JobStatusRecord, JobType, ProjectId, StatusUpdate};

use crate::broker::{InMemoryBroker, JobBroker, RedisStreamBroker};
use crate::config::{QueueConfig, QueueSettings, RetryPolicy};
use crate::error::{QueueError, QueueResult};
use crate::events::EventBus;
use crate::job::QueueJob;
use crate::status::{InMemoryStatusStore, JobStatusTracker, RedisStatusStore, StatusStore};

/// A named queue and its fixed settings.
#[derive(Debug, Clone, Copy)]
pub struct QueueHandle {
    job_type: JobType,
    settings: QueueSettings,
}

impl QueueHandle {
    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    pub fn name(&self) -> &'static str {
        self.job_type.as_str()
    }

    pub fn concurrency(&self) -> usize {
        self.settings.concurrency
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.settings.retry
    }
}

/// Owns the queues, the status tracker and the event bus.
///
/// Built once at startup and passed to everything that enqueues jobs or
/// runs workers.
#[derive(Clone)]
pub struct QueueManager {
    broker: Arc<dyn JobBroker>,
    tracker: JobStatusTracker,
    events: EventBus,
    queues: HashMap<JobType, QueueHandle>,
    config: QueueConfig,
}

impl QueueManager {
    pub fn new(
        broker: Arc<dyn JobBroker>,
        status_store: Arc<dyn StatusStore>,
        config: QueueConfig,
    ) -> Self {
        let queues = JobType::ALL
            .iter()
            .map(|t| {
                (
                    *t,
                    QueueHandle {
                        job_type: *t,
                        settings: config.settings(*t),
                    },
                )
            })
            .collect();

        Self {
            broker,
            tracker: JobStatusTracker::new(status_store),
            events: EventBus::default(),
            queues,
            config,
        }
    }

    /// Connect to Redis; the broker and status store share one client.
    pub async fn connect(config: QueueConfig) -> QueueResult<Self> {
        let broker = RedisStreamBroker::connect(&config).await?;
        let status_store = RedisStatusStore::new(
            broker.connection(),
            config.key_prefix.clone(),
            config.status_ttl,
        );
        let manager = Self::new(Arc::new(broker), Arc::new(status_store), config);
        manager.init().await?;
        Ok(manager)
    }

    /// Manager backed entirely by process memory.
    pub fn in_memory(config: QueueConfig) -> Self {
        Self::new(
            Arc::new(InMemoryBroker::new()),
            Arc::new(InMemoryStatusStore::new()),
            config,
        )
    }

    /// Declare every queue on the broker.
    pub async fn init(&self) -> QueueResult<()> {
        for queue in self.queues.values() {
            self.broker.declare_queue(queue.name()).await?;
        }
        info!(queues = self.queues.len(), "Queues initialized");
        Ok(())
    }

    /// Create the job's status record and publish it on its queue.
    pub async fn enqueue(
        &self,
        job_type: JobType,
        project_id: ProjectId,
        input_data: serde_json::Value,
    ) -> QueueResult<JobId> {
        let queue = self.queue(job_type)?;
        let job = QueueJob::new(job_type, project_id, input_data);

        let record = JobStatusRecord::new(job.job_id.clone(), job_type, job.project_id.clone());
        self.tracker.create(&record).await?;

        if let Err(e) = self.broker.publish(queue.name(), &job).await {
            // Keep the record from sitting in `queued` forever
            if let Err(mark_err) = self
                .tracker
                .update_job_status(&job.job_id, StatusUpdate::failed(e.to_string()))
                .await
            {
                warn!(job_id = %job.job_id, "Failed to mark unpublished job as failed: {}", mark_err);
            }
            return Err(e);
        }

        info!(
            job_id = %job.job_id,
            queue = queue.name(),
            project_id = %job.project_id,
            "Job enqueued"
        );
        Ok(job.job_id)
    }

    pub async fn update_job_status(
        &self,
        job_id: &JobId,
        update: StatusUpdate,
    ) -> QueueResult<JobStatusRecord> {
        self.tracker.update_job_status(job_id, update).await
    }

    pub async fn get_job_status(&self, job_id: &JobId) -> QueueResult<Option<JobStatusRecord>> {
        self.tracker.get_job_status(job_id).await
    }

    pub fn queue(&self, job_type: JobType) -> QueueResult<QueueHandle> {
        self.queues
            .get(&job_type)
            .copied()
            .ok_or_else(|| QueueError::UnknownQueue(job_type.to_string()))
    }

    pub fn broker(&self) -> Arc<dyn JobBroker> {
        Arc::clone(&self.broker)
    }

    pub fn tracker(&self) -> &JobStatusTracker {
        &self.tracker
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }
}
