//! Structured job logging utilities.

use tracing::{error, info, warn, Span};

use mgen_models::{JobId, JobType, ProjectId};

/// Per-job logger carrying the job id, queue and project on every line.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    queue: &'static str,
    project_id: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, queue: JobType, project_id: &ProjectId) -> Self {
        Self {
            job_id: job_id.to_string(),
            queue: queue.as_str(),
            project_id: project_id.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            queue = self.queue,
            project_id = %self.project_id,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, progress: u8, message: &str) {
        info!(
            job_id = %self.job_id,
            queue = self.queue,
            progress = progress,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            queue = self.queue,
            project_id = %self.project_id,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            queue = self.queue,
            project_id = %self.project_id,
            "Job error: {}", message
        );
    }

    /// Log the end of a processing step; outcomes are logged by the event bus.
    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            queue = self.queue,
            "Job step completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn queue(&self) -> &'static str {
        self.queue
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            queue = self.queue,
            project_id = %self.project_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, JobType::VideoStitching, &ProjectId::new("p1"));

        assert_eq!(logger.job_id(), job_id.to_string());
        assert_eq!(logger.queue(), "video-stitching");
    }
}
