//! Worker lifecycle events.
//!
//! Every worker publishes to one shared [`EventBus`]; job outcomes are
//! logged by the bus's logger task and nowhere else.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use mgen_models::{JobId, JobType};

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerEventKind {
    Completed,
    Failed { error: String, will_retry: bool },
    /// A delivery was reclaimed from a consumer that stopped responding
    Stalled,
    /// Worker-level failure not tied to a single job outcome
    Error { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerEvent {
    pub queue: JobType,
    pub job_id: Option<JobId>,
    #[serde(flatten)]
    pub kind: WorkerEventKind,
    pub at: DateTime<Utc>,
}

impl WorkerEvent {
    pub fn completed(queue: JobType, job_id: JobId) -> Self {
        Self::new(queue, Some(job_id), WorkerEventKind::Completed)
    }

    pub fn failed(queue: JobType, job_id: JobId, error: impl Into<String>, will_retry: bool) -> Self {
        Self::new(
            queue,
            Some(job_id),
            WorkerEventKind::Failed {
                error: error.into(),
                will_retry,
            },
        )
    }

    pub fn stalled(queue: JobType, job_id: JobId) -> Self {
        Self::new(queue, Some(job_id), WorkerEventKind::Stalled)
    }

    pub fn error(queue: JobType, job_id: Option<JobId>, message: impl Into<String>) -> Self {
        Self::new(
            queue,
            job_id,
            WorkerEventKind::Error {
                message: message.into(),
            },
        )
    }

    fn new(queue: JobType, job_id: Option<JobId>, kind: WorkerEventKind) -> Self {
        Self {
            queue,
            job_id,
            kind,
            at: Utc::now(),
        }
    }
}

/// Fan-in point for every worker's lifecycle events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WorkerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Events are dropped when nobody is subscribed.
    pub fn emit(&self, event: WorkerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.tx.subscribe()
    }

    /// Spawn the task that logs every event. It ends once all senders are gone.
    pub fn spawn_logger(&self) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => log_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Event logger lagged; events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

fn log_event(event: &WorkerEvent) {
    let job_id = event
        .job_id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_default();

    match &event.kind {
        WorkerEventKind::Completed => {
            info!(queue = %event.queue, job_id = %job_id, "Job completed");
        }
        WorkerEventKind::Failed {
            error,
            will_retry: true,
        } => {
            warn!(queue = %event.queue, job_id = %job_id, "Job attempt failed, will retry: {}", error);
        }
        WorkerEventKind::Failed {
            error,
            will_retry: false,
        } => {
            error!(queue = %event.queue, job_id = %job_id, "Job failed: {}", error);
        }
        WorkerEventKind::Stalled => {
            warn!(queue = %event.queue, job_id = %job_id, "Job stalled and was reclaimed");
        }
        WorkerEventKind::Error { message } => {
            error!(queue = %event.queue, job_id = %job_id, "Worker error: {}", message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let job_id = JobId::new();

        bus.emit(WorkerEvent::failed(
            JobType::VideoStitching,
            job_id.clone(),
            "download failed",
            false,
        ));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id, Some(job_id));
        assert_eq!(
            event.kind,
            WorkerEventKind::Failed {
                error: "download failed".to_string(),
                will_retry: false
            }
        );
    }

    #[tokio::test]
    async fn test_emit_without_subscribers() {
        let bus = EventBus::default();
        bus.emit(WorkerEvent::completed(JobType::ImageEdit, JobId::new()));
    }

    #[tokio::test]
    async fn test_logger_stops_when_bus_dropped() {
        let bus = EventBus::new(4);
        let handle = bus.spawn_logger();
        bus.emit(WorkerEvent::stalled(JobType::VideoGeneration, JobId::new()));
        drop(bus);
        handle.await.unwrap();
    }

    #[test]
    fn test_event_serialization() {
        let event = WorkerEvent::error(JobType::ContentPlanning, None, "redis down");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "error");
        assert_eq!(json["message"], "redis down");
        assert_eq!(json["queue"], "content-planning");
    }
}
