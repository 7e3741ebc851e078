//! Job queues over Redis Streams.
//!
//! This crate provides:
//! - One queue per job type, sharing a single broker
//! - Consumer-group delivery with per-queue retry and dead-lettering
//! - Job status records with a monotonic progress tracker
//! - A lifecycle event bus shared by every worker

pub mod broker;
pub mod config;
pub mod error;
pub mod events;
pub mod job;
pub mod manager;
pub mod status;

pub use broker::{DeadLetter, InMemoryBroker, JobBroker, RedisStreamBroker};
pub use config::{QueueConfig, QueueSettings, RetryPolicy};
pub use error::{QueueError, QueueResult};
pub use events::{EventBus, WorkerEvent, WorkerEventKind};
pub use job::{Delivery, NackOutcome, QueueJob};
pub use manager::{QueueHandle, QueueManager};
pub use status::{InMemoryStatusStore, JobStatusTracker, RedisStatusStore, StatusStore};
