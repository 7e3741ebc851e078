//! Queue job envelope and broker deliveries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mgen_models::{JobId, JobType, ProjectId};

/// A job as published on a queue.
///
/// `input_data` stays opaque here; each processor decodes it into its own
/// typed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    pub job_id: JobId,
    pub job_type: JobType,
    pub project_id: ProjectId,
    #[serde(default)]
    pub input_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl QueueJob {
    pub fn new(job_type: JobType, project_id: ProjectId, input_data: serde_json::Value) -> Self {
        Self {
            job_id: JobId::new(),
            job_type,
            project_id,
            input_data,
            created_at: Utc::now(),
        }
    }

    /// Key used to recognise redeliveries of the same job.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.job_type, self.job_id)
    }
}

/// A job handed to a consumer, pending acknowledgement.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Broker-assigned message id
    pub id: String,
    /// Queue the delivery came from
    pub queue: String,
    pub job: QueueJob,
    /// 1-based attempt number
    pub attempt: u32,
}

/// What the broker did with a negatively acknowledged delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    /// Scheduled for another attempt after `delay`
    Retry { next_attempt: u32, delay: Duration },
    /// Moved to the dead-letter stream
    DeadLettered,
}

impl NackOutcome {
    pub fn will_retry(&self) -> bool {
        matches!(self, NackOutcome::Retry { .. })
    }
}
