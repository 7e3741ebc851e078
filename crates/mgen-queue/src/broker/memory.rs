//! In-process broker for local runs and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::JobBroker;
use crate::config::RetryPolicy;
use crate::error::{QueueError, QueueResult};
use crate::job::{Delivery, NackOutcome, QueueJob};

/// A job that exhausted its attempts.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub job: QueueJob,
    pub error: String,
    pub attempts: u32,
}

struct Pending {
    delivery: Delivery,
    fetched_at: Instant,
}

#[derive(Default)]
struct QueueSlot {
    ready: VecDeque<(QueueJob, u32)>,
    pending: HashMap<String, Pending>,
    dead: Vec<DeadLetter>,
    notify: Arc<Notify>,
}

#[derive(Default)]
struct Inner {
    queues: Mutex<HashMap<String, QueueSlot>>,
    next_id: AtomicU64,
}

impl Inner {
    async fn push_ready(&self, queue: &str, job: QueueJob, attempt: u32) {
        let mut queues = self.queues.lock().await;
        let slot = queues.entry(queue.to_string()).or_default();
        slot.ready.push_back((job, attempt));
        slot.notify.notify_one();
    }
}

/// Broker keeping every queue in memory.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs waiting to be fetched.
    pub async fn ready_len(&self, queue: &str) -> usize {
        let queues = self.inner.queues.lock().await;
        queues.get(queue).map(|s| s.ready.len()).unwrap_or(0)
    }

    /// Deliveries fetched but not yet acknowledged.
    pub async fn pending_len(&self, queue: &str) -> usize {
        let queues = self.inner.queues.lock().await;
        queues.get(queue).map(|s| s.pending.len()).unwrap_or(0)
    }

    pub async fn dead_letters(&self, queue: &str) -> Vec<DeadLetter> {
        let queues = self.inner.queues.lock().await;
        queues.get(queue).map(|s| s.dead.clone()).unwrap_or_default()
    }

    fn next_id(&self) -> String {
        let n = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-0", n)
    }
}

#[async_trait]
impl JobBroker for InMemoryBroker {
    async fn declare_queue(&self, queue: &str) -> QueueResult<()> {
        let mut queues = self.inner.queues.lock().await;
        queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, job: &QueueJob) -> QueueResult<String> {
        let mut queues = self.inner.queues.lock().await;
        let slot = queues.entry(queue.to_string()).or_default();

        let duplicate = slot.ready.iter().any(|(j, _)| j.job_id == job.job_id)
            || slot.pending.values().any(|p| p.delivery.job.job_id == job.job_id);
        if duplicate {
            warn!(queue = queue, job_id = %job.job_id, "Duplicate job rejected");
            return Err(QueueError::enqueue_failed("Duplicate job"));
        }

        slot.ready.push_back((job.clone(), 1));
        slot.notify.notify_one();
        debug!(queue = queue, job_id = %job.job_id, "Enqueued job");
        Ok(job.job_id.to_string())
    }

    async fn fetch(
        &self,
        queue: &str,
        consumer: &str,
        max: usize,
        block: Duration,
    ) -> QueueResult<Vec<Delivery>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let deadline = Instant::now() + block;

        loop {
            let notify = {
                let mut queues = self.inner.queues.lock().await;
                let slot = queues.entry(queue.to_string()).or_default();

                let mut deliveries = Vec::new();
                while deliveries.len() < max {
                    let Some((job, attempt)) = slot.ready.pop_front() else {
                        break;
                    };
                    let delivery = Delivery {
                        id: self.next_id(),
                        queue: queue.to_string(),
                        job,
                        attempt,
                    };
                    slot.pending.insert(
                        delivery.id.clone(),
                        Pending {
                            delivery: delivery.clone(),
                            fetched_at: Instant::now(),
                        },
                    );
                    deliveries.push(delivery);
                }

                if !deliveries.is_empty() {
                    debug!(queue = queue, consumer = consumer, count = deliveries.len(), "Fetched jobs");
                    return Ok(deliveries);
                }
                slot.notify.clone()
            };

            if tokio::time::timeout_at(deadline, notify.notified()).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut queues = self.inner.queues.lock().await;
        if let Some(slot) = queues.get_mut(&delivery.queue) {
            slot.pending.remove(&delivery.id);
        }
        Ok(())
    }

    async fn nack(
        &self,
        delivery: &Delivery,
        error: &str,
        policy: &RetryPolicy,
    ) -> QueueResult<NackOutcome> {
        {
            let mut queues = self.inner.queues.lock().await;
            let slot = queues
                .get_mut(&delivery.queue)
                .ok_or_else(|| QueueError::UnknownQueue(delivery.queue.clone()))?;
            if slot.pending.remove(&delivery.id).is_none() {
                return Err(QueueError::DeliveryNotFound(delivery.id.clone()));
            }

            if !policy.should_retry(delivery.attempt) {
                slot.dead.push(DeadLetter {
                    job: delivery.job.clone(),
                    error: error.to_string(),
                    attempts: delivery.attempt,
                });
                warn!(
                    queue = %delivery.queue,
                    job_id = %delivery.job.job_id,
                    "Moved job to DLQ: {}",
                    error
                );
                return Ok(NackOutcome::DeadLettered);
            }
        }

        let delay = policy.delay_for_attempt(delivery.attempt);
        let next_attempt = delivery.attempt + 1;
        let inner = Arc::clone(&self.inner);
        let queue = delivery.queue.clone();
        let job = delivery.job.clone();

        if delay.is_zero() {
            inner.push_ready(&queue, job, next_attempt).await;
        } else {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                inner.push_ready(&queue, job, next_attempt).await;
            });
        }

        Ok(NackOutcome::Retry {
            next_attempt,
            delay,
        })
    }

    async fn touch(&self, queue: &str, _consumer: &str, ids: &[String]) -> QueueResult<()> {
        let mut queues = self.inner.queues.lock().await;
        if let Some(slot) = queues.get_mut(queue) {
            let now = Instant::now();
            for id in ids {
                if let Some(pending) = slot.pending.get_mut(id) {
                    pending.fetched_at = now;
                }
            }
        }
        Ok(())
    }

    async fn claim_stalled(
        &self,
        queue: &str,
        _consumer: &str,
        min_idle: Duration,
        max: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut queues = self.inner.queues.lock().await;
        let Some(slot) = queues.get_mut(queue) else {
            return Ok(Vec::new());
        };

        let now = Instant::now();
        let claimed = slot
            .pending
            .values_mut()
            .filter(|p| now.duration_since(p.fetched_at) >= min_idle)
            .take(max)
            .map(|p| {
                p.fetched_at = now;
                p.delivery.clone()
            })
            .collect();
        Ok(claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgen_models::{JobType, ProjectId};

    fn job() -> QueueJob {
        QueueJob::new(JobType::ContentPlanning, ProjectId::new("p1"), serde_json::json!({}))
    }

    const BLOCK: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_publish_fetch_ack() {
        let broker = InMemoryBroker::new();
        broker.publish("q", &job()).await.unwrap();
        broker.publish("q", &job()).await.unwrap();

        let deliveries = broker.fetch("q", "c1", 5, BLOCK).await.unwrap();
        assert_eq!(deliveries.len(), 2);
        assert!(deliveries.iter().all(|d| d.attempt == 1));
        assert_eq!(broker.pending_len("q").await, 2);

        for d in &deliveries {
            broker.ack(d).await.unwrap();
        }
        assert_eq!(broker.pending_len("q").await, 0);
    }

    #[tokio::test]
    async fn test_fetch_respects_max() {
        let broker = InMemoryBroker::new();
        for _ in 0..3 {
            broker.publish("q", &job()).await.unwrap();
        }
        assert_eq!(broker.fetch("q", "c1", 1, BLOCK).await.unwrap().len(), 1);
        assert_eq!(broker.ready_len("q").await, 2);
    }

    #[tokio::test]
    async fn test_fetch_times_out_empty() {
        let broker = InMemoryBroker::new();
        let deliveries = broker.fetch("q", "c1", 1, BLOCK).await.unwrap();
        assert!(deliveries.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_wakes_on_publish() {
        let broker = InMemoryBroker::new();
        let fetcher = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.fetch("q", "c1", 1, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.publish("q", &job()).await.unwrap();

        let deliveries = fetcher.await.unwrap().unwrap();
        assert_eq!(deliveries.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_publish_rejected() {
        let broker = InMemoryBroker::new();
        let job = job();
        broker.publish("q", &job).await.unwrap();
        assert!(broker.publish("q", &job).await.is_err());
    }

    #[tokio::test]
    async fn test_nack_redelivers_then_dead_letters() {
        let broker = InMemoryBroker::new();
        let policy = RetryPolicy::default()
            .with_max_attempts(2)
            .with_base_delay(Duration::ZERO);
        broker.publish("q", &job()).await.unwrap();

        let first = broker.fetch("q", "c1", 1, BLOCK).await.unwrap().remove(0);
        let outcome = broker.nack(&first, "boom", &policy).await.unwrap();
        assert!(outcome.will_retry());

        let second = broker.fetch("q", "c1", 1, BLOCK).await.unwrap().remove(0);
        assert_eq!(second.attempt, 2);
        assert_eq!(second.job.job_id, first.job.job_id);

        let outcome = broker.nack(&second, "boom again", &policy).await.unwrap();
        assert_eq!(outcome, NackOutcome::DeadLettered);

        let dead = broker.dead_letters("q").await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].error, "boom again");
        assert_eq!(dead[0].attempts, 2);
        assert_eq!(broker.ready_len("q").await, 0);
    }

    #[tokio::test]
    async fn test_claim_stalled() {
        let broker = InMemoryBroker::new();
        broker.publish("q", &job()).await.unwrap();
        let delivery = broker.fetch("q", "c1", 1, BLOCK).await.unwrap().remove(0);

        let none = broker
            .claim_stalled("q", "c2", Duration::from_secs(60), 10)
            .await
            .unwrap();
        assert!(none.is_empty());

        let claimed = broker
            .claim_stalled("q", "c2", Duration::ZERO, 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, delivery.id);
    }

    #[tokio::test]
    async fn test_touch_keeps_delivery_from_being_claimed() {
        let broker = InMemoryBroker::new();
        broker.publish("q", &job()).await.unwrap();
        let delivery = broker.fetch("q", "c1", 1, BLOCK).await.unwrap().remove(0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        broker
            .touch("q", "c1", std::slice::from_ref(&delivery.id))
            .await
            .unwrap();

        let claimed = broker
            .claim_stalled("q", "c2", Duration::from_millis(50), 10)
            .await
            .unwrap();
        assert!(claimed.is_empty());
        assert_eq!(broker.pending_len("q").await, 1);
    }
}
