//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Download failed: {0}")]
    Download(String),

    #[error("Processing failed: {0}")]
    Processing(String),

    #[error("Invalid job input: {0}")]
    Validation(String),

    /// Generation provider failure, carrying the provider's own message
    #[error("{message}")]
    Provider { message: String, retryable: bool },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] mgen_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] mgen_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] mgen_queue::QueueError),

    #[error("Firestore error: {0}")]
    Firestore(#[from] mgen_firestore::FirestoreError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn download(msg: impl Into<String>) -> Self {
        Self::Download(msg.into())
    }

    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn provider(msg: impl Into<String>, retryable: bool) -> Self {
        Self::Provider {
            message: msg.into(),
            retryable,
        }
    }

    /// Whether another attempt could succeed.
    ///
    /// Invalid input, bad configuration and merge failures fail the same
    /// way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Download(_)
            | WorkerError::Storage(_)
            | WorkerError::Queue(_)
            | WorkerError::Http(_)
            | WorkerError::Io(_) => true,
            WorkerError::Firestore(e) => e.is_retryable(),
            WorkerError::Provider { retryable, .. } => *retryable,
            WorkerError::Processing(_)
            | WorkerError::Validation(_)
            | WorkerError::Config(_)
            | WorkerError::Media(_) => false,
        }
    }
}

impl From<validator::ValidationErrors> for WorkerError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_taxonomy() {
        assert!(WorkerError::download("HTTP 503").is_retryable());
        assert!(!WorkerError::validation("prompt must not be empty").is_retryable());
        assert!(!WorkerError::processing("merge failed").is_retryable());
        assert!(WorkerError::provider("overloaded", true).is_retryable());
        assert!(!WorkerError::provider("content policy", false).is_retryable());
    }

    #[test]
    fn test_provider_message_is_unmodified() {
        let err = WorkerError::provider("quota exhausted for model", true);
        assert_eq!(err.to_string(), "quota exhausted for model");
    }
}
