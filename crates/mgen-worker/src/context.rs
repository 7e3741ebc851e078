//! Per-job context handed to processors.

use serde::de::DeserializeOwned;
use validator::Validate;

use mgen_models::{JobId, JobType, ProjectId, StatusUpdate};
use mgen_queue::{JobStatusTracker, QueueJob};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// What a processor knows about the job it is running.
pub struct JobContext {
    job: QueueJob,
    attempt: u32,
    tracker: JobStatusTracker,
    logger: JobLogger,
}

impl JobContext {
    pub fn new(job: QueueJob, attempt: u32, tracker: JobStatusTracker) -> Self {
        let logger = JobLogger::new(&job.job_id, job.job_type, &job.project_id);
        Self {
            job,
            attempt,
            tracker,
            logger,
        }
    }

    pub fn job(&self) -> &QueueJob {
        &self.job
    }

    pub fn job_id(&self) -> &JobId {
        &self.job.job_id
    }

    pub fn job_type(&self) -> JobType {
        self.job.job_type
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.job.project_id
    }

    /// 1-based attempt number of this delivery.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn logger(&self) -> &JobLogger {
        &self.logger
    }

    /// Decode and validate the job's input payload.
    pub fn input<T>(&self) -> WorkerResult<T>
    where
        T: DeserializeOwned + Validate,
    {
        let input: T = serde_json::from_value(self.job.input_data.clone())
            .map_err(|e| WorkerError::validation(e.to_string()))?;
        input.validate()?;
        Ok(input)
    }

    /// Report a progress checkpoint.
    ///
    /// A failed status write is logged and otherwise ignored; it never fails
    /// the job.
    pub async fn progress(&self, progress: u8, message: &str) {
        self.logger.log_progress(progress, message);
        if let Err(e) = self
            .tracker
            .update_job_status(&self.job.job_id, StatusUpdate::progress(progress))
            .await
        {
            self.logger
                .log_warning(&format!("Failed to record progress {}: {}", progress, e));
        }
    }
}
