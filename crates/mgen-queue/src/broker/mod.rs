//! Message brokers backing the job queues.
//!
//! Delivery is at-least-once: a fetched job stays pending until it is
//! acknowledged, negatively acknowledged, or reclaimed after going stale.

mod memory;
mod redis_streams;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::RetryPolicy;
use crate::error::QueueResult;
use crate::job::{Delivery, NackOutcome, QueueJob};

pub use self::memory::{DeadLetter, InMemoryBroker};
pub use self::redis_streams::RedisStreamBroker;

#[async_trait]
pub trait JobBroker: Send + Sync {
    /// Create whatever the broker needs for a queue. Idempotent.
    async fn declare_queue(&self, queue: &str) -> QueueResult<()>;

    /// Publish a job, returning the broker's message id.
    async fn publish(&self, queue: &str, job: &QueueJob) -> QueueResult<String>;

    /// Fetch up to `max` jobs, blocking up to `block` when none are ready.
    async fn fetch(
        &self,
        queue: &str,
        consumer: &str,
        max: usize,
        block: Duration,
    ) -> QueueResult<Vec<Delivery>>;

    /// Acknowledge a finished delivery.
    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Reject a delivery; it is redelivered or dead-lettered per `policy`.
    async fn nack(
        &self,
        delivery: &Delivery,
        error: &str,
        policy: &RetryPolicy,
    ) -> QueueResult<NackOutcome>;

    /// Reset the idle time of deliveries `consumer` is still working on, so
    /// `claim_stalled` only sees deliveries whose consumer went away.
    async fn touch(&self, queue: &str, consumer: &str, ids: &[String]) -> QueueResult<()>;

    /// Take over deliveries left unacknowledged for at least `min_idle`.
    async fn claim_stalled(
        &self,
        queue: &str,
        consumer: &str,
        min_idle: Duration,
        max: usize,
    ) -> QueueResult<Vec<Delivery>>;
}
