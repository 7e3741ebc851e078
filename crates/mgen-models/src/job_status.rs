//! Job status records and the status state machine.
//!
//! A record is created in `queued` by the producer, moved to `processing`
//! by the worker that owns the job, and finalized as `completed` or
//! `failed`. Terminal records never change again, and progress never
//! moves backwards.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{JobId, JobType, ProjectId};

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is queued waiting for a worker
    #[default]
    Queued,
    /// Job is actively being processed
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed with an error
    Failed,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A requested status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: JobStatus,
    pub progress: Option<u8>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl StatusUpdate {
    /// Progress checkpoint while processing.
    pub fn progress(progress: u8) -> Self {
        Self {
            status: JobStatus::Processing,
            progress: Some(progress),
            output: None,
            error: None,
        }
    }

    /// Successful completion with the job's output payload.
    pub fn completed(output: serde_json::Value) -> Self {
        Self {
            status: JobStatus::Completed,
            progress: Some(100),
            output: Some(output),
            error: None,
        }
    }

    /// Failure with the originating error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            progress: None,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Persisted status of a single job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobStatusRecord {
    /// Unique job identifier
    pub job_id: JobId,
    /// Type of job (selects the queue)
    pub job_type: JobType,
    /// Owning project
    pub project_id: ProjectId,
    /// Current job status
    pub status: JobStatus,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Output payload, set only on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_data: Option<serde_json::Value>,
    /// Error message, set only on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the status was last updated
    pub updated_at: DateTime<Utc>,
}

/// Reasons a status transition is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("job {job_id} is already {status} and cannot move to {requested}")]
    AlreadyTerminal {
        job_id: String,
        status: JobStatus,
        requested: JobStatus,
    },

    #[error("job {0} cannot return to queued")]
    Requeue(String),
}

impl JobStatusRecord {
    /// Create a new queued record.
    pub fn new(job_id: JobId, job_type: JobType, project_id: ProjectId) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            job_type,
            project_id,
            status: JobStatus::Queued,
            progress: 0,
            output_data: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a transition in place.
    ///
    /// Progress is clamped to 100 and never lowered; completion forces 100.
    /// Output is kept only on completion, the error only on failure.
    pub fn apply(&mut self, update: StatusUpdate) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::AlreadyTerminal {
                job_id: self.job_id.to_string(),
                status: self.status,
                requested: update.status,
            });
        }
        if update.status == JobStatus::Queued && self.status != JobStatus::Queued {
            return Err(TransitionError::Requeue(self.job_id.to_string()));
        }

        if let Some(progress) = update.progress {
            self.progress = self.progress.max(progress.min(100));
        }

        match update.status {
            JobStatus::Completed => {
                self.progress = 100;
                self.output_data = update.output;
                self.error_message = None;
            }
            JobStatus::Failed => {
                self.output_data = None;
                self.error_message = update.error;
            }
            JobStatus::Queued | JobStatus::Processing => {}
        }

        self.status = update.status;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobStatusRecord {
        JobStatusRecord::new(
            JobId::from_string("job-1"),
            JobType::VideoGeneration,
            ProjectId::new("project-1"),
        )
    }

    #[test]
    fn test_record_creation() {
        let record = record();
        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(record.progress, 0);
        assert!(!record.is_terminal());
    }

    #[test]
    fn test_status_transitions() {
        let mut record = record();

        record.apply(StatusUpdate::progress(10)).unwrap();
        assert_eq!(record.status, JobStatus::Processing);
        assert_eq!(record.progress, 10);

        record
            .apply(StatusUpdate::completed(serde_json::json!({"video_url": "u"})))
            .unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.progress, 100);
        assert!(record.output_data.is_some());
        assert!(record.is_terminal());
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut record = record();
        record.apply(StatusUpdate::progress(40)).unwrap();
        record.apply(StatusUpdate::progress(10)).unwrap();
        assert_eq!(record.progress, 40);

        record.apply(StatusUpdate::progress(250)).unwrap();
        assert_eq!(record.progress, 100);
    }

    #[test]
    fn test_terminal_record_rejects_updates() {
        let mut record = record();
        record.apply(StatusUpdate::failed("provider down")).unwrap();
        assert_eq!(record.error_message.as_deref(), Some("provider down"));
        assert!(record.output_data.is_none());

        let err = record.apply(StatusUpdate::progress(90)).unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyTerminal { .. }));
        let err = record
            .apply(StatusUpdate::completed(serde_json::json!({})))
            .unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyTerminal { .. }));
        assert_eq!(record.status, JobStatus::Failed);
    }

    #[test]
    fn test_cannot_requeue() {
        let mut record = record();
        record.apply(StatusUpdate::progress(10)).unwrap();
        let update = StatusUpdate {
            status: JobStatus::Queued,
            progress: None,
            output: None,
            error: None,
        };
        assert!(matches!(
            record.apply(update),
            Err(TransitionError::Requeue(_))
        ));
    }

    #[test]
    fn test_record_serialization_skips_empty_fields() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["job_type"], "video-generation");
        assert!(json.get("output_data").is_none());
        assert!(json.get("error_message").is_none());
    }
}
