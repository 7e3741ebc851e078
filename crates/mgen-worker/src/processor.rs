//! Processor contract shared by every worker.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::JobContext;
use crate::error::{WorkerError, WorkerResult};

/// Does the work for one queue.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Run one job, returning the output payload to record on completion.
    async fn process(&self, ctx: &JobContext) -> WorkerResult<Value>;
}

/// Result of one processor invocation, as the pool sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Success(Value),
    Failure { message: String, retryable: bool },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success(_))
    }
}

impl From<WorkerResult<Value>> for JobOutcome {
    fn from(result: WorkerResult<Value>) -> Self {
        match result {
            Ok(output) => JobOutcome::Success(output),
            Err(e) => JobOutcome::from(e),
        }
    }
}

impl From<WorkerError> for JobOutcome {
    fn from(error: WorkerError) -> Self {
        JobOutcome::Failure {
            retryable: error.is_retryable(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_result() {
        let ok: WorkerResult<Value> = Ok(serde_json::json!({"video_url": "u"}));
        assert!(JobOutcome::from(ok).is_success());

        let err: WorkerResult<Value> = Err(WorkerError::validation("video_urls must not be empty"));
        assert_eq!(
            JobOutcome::from(err),
            JobOutcome::Failure {
                message: "Invalid job input: video_urls must not be empty".to_string(),
                retryable: false,
            }
        );
    }
}
