//! Job broker on Redis Streams consumer groups.
//!
//! Each queue is one stream. Failed deliveries that have attempts left are
//! parked in a sorted set scored by their ready time and moved back onto the
//! stream by the next fetch; exhausted ones go to a per-queue dead-letter
//! stream.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamAutoClaimReply, StreamId, StreamReadReply};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::JobBroker;
use crate::config::{QueueConfig, RetryPolicy};
use crate::error::{QueueError, QueueResult};
use crate::job::{Delivery, NackOutcome, QueueJob};

/// Duplicate-publish guard lifetime.
const DEDUP_TTL_SECS: u64 = 3600;

/// Delayed entries moved back per fetch.
const PROMOTE_BATCH: usize = 100;

#[derive(Serialize, Deserialize)]
struct DelayedEntry {
    job: QueueJob,
    attempt: u32,
}

/// Redis Streams broker.
pub struct RedisStreamBroker {
    client: redis::Client,
    conn: MultiplexedConnection,
    key_prefix: String,
    consumer_group: String,
}

impl RedisStreamBroker {
    /// Connect using the queue configuration.
    pub async fn connect(config: &QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        Ok(Self {
            client,
            conn,
            key_prefix: config.key_prefix.clone(),
            consumer_group: config.consumer_group.clone(),
        })
    }

    /// Shared multiplexed connection for non-blocking commands.
    pub fn connection(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    fn stream_key(&self, queue: &str) -> String {
        format!("{}:queue:{}", self.key_prefix, queue)
    }

    fn dlq_key(&self, queue: &str) -> String {
        format!("{}:queue:{}:dlq", self.key_prefix, queue)
    }

    fn delayed_key(&self, queue: &str) -> String {
        format!("{}:queue:{}:delayed", self.key_prefix, queue)
    }

    /// Number of entries on a queue's stream.
    pub async fn len(&self, queue: &str) -> QueueResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.xlen(self.stream_key(queue)).await?;
        Ok(len)
    }

    /// Number of dead-lettered jobs for a queue.
    pub async fn dlq_len(&self, queue: &str) -> QueueResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.xlen(self.dlq_key(queue)).await?;
        Ok(len)
    }

    async fn add_entry(&self, queue: &str, job: &QueueJob, attempt: u32) -> QueueResult<String> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(job)?;
        let message_id: String = redis::cmd("XADD")
            .arg(self.stream_key(queue))
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("attempt")
            .arg(attempt)
            .query_async(&mut conn)
            .await?;
        Ok(message_id)
    }

    /// Move due retries from the delayed set back onto the stream.
    async fn promote_delayed(&self, queue: &str) -> QueueResult<usize> {
        let mut conn = self.conn.clone();
        let key = self.delayed_key(queue);
        let now_ms = chrono::Utc::now().timestamp_millis();

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(now_ms)
            .arg("LIMIT")
            .arg(0)
            .arg(PROMOTE_BATCH)
            .query_async(&mut conn)
            .await?;

        let mut promoted = 0;
        for member in due {
            // Only the consumer that removes the member re-publishes it
            let removed: i64 = conn.zrem(&key, &member).await?;
            if removed == 0 {
                continue;
            }
            match serde_json::from_str::<DelayedEntry>(&member) {
                Ok(entry) => {
                    self.add_entry(queue, &entry.job, entry.attempt).await?;
                    debug!(
                        queue = queue,
                        job_id = %entry.job.job_id,
                        attempt = entry.attempt,
                        "Promoted delayed retry"
                    );
                    promoted += 1;
                }
                Err(e) => warn!(queue = queue, "Dropping malformed delayed entry: {}", e),
            }
        }
        Ok(promoted)
    }

    async fn parse_entries(&self, queue: &str, entries: Vec<StreamId>) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(entries.len());
        for entry in entries {
            let payload: Option<String> = entry.get("job");
            let attempt: u32 = entry.get("attempt").unwrap_or(1);
            let parsed = payload
                .as_deref()
                .map(serde_json::from_str::<QueueJob>);

            match parsed {
                Some(Ok(job)) => deliveries.push(Delivery {
                    id: entry.id,
                    queue: queue.to_string(),
                    job,
                    attempt,
                }),
                Some(Err(e)) => {
                    warn!(queue = queue, "Failed to parse job payload {}: {}", entry.id, e);
                    // Ack the malformed message to prevent reprocessing
                    self.ack_id(queue, &entry.id).await.ok();
                }
                None => {
                    warn!(queue = queue, "Stream entry {} has no job payload", entry.id);
                    self.ack_id(queue, &entry.id).await.ok();
                }
            }
        }
        deliveries
    }

    async fn ack_id(&self, queue: &str, message_id: &str) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let stream = self.stream_key(queue);

        redis::cmd("XACK")
            .arg(&stream)
            .arg(&self.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&stream)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!(queue = queue, "Acknowledged message {}", message_id);
        Ok(())
    }
}

#[async_trait]
impl JobBroker for RedisStreamBroker {
    async fn declare_queue(&self, queue: &str) -> QueueResult<()> {
        let mut conn = self.conn.clone();

        // Start at "0" so jobs published before the group existed are served
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(self.stream_key(queue))
            .arg(&self.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!(queue = queue, "Created consumer group: {}", self.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(queue = queue, "Consumer group already exists: {}", self.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }
        Ok(())
    }

    async fn publish(&self, queue: &str, job: &QueueJob) -> QueueResult<String> {
        let mut conn = self.conn.clone();

        let dedup_key = format!("{}:dedup:{}", self.key_prefix, job.idempotency_key());
        let fresh: Option<String> = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(DEDUP_TTL_SECS)
            .query_async(&mut conn)
            .await?;
        if fresh.is_none() {
            warn!(queue = queue, job_id = %job.job_id, "Duplicate job rejected");
            return Err(QueueError::enqueue_failed("Duplicate job"));
        }

        let message_id = self.add_entry(queue, job, 1).await?;
        info!(
            queue = queue,
            job_id = %job.job_id,
            "Enqueued job with message ID {}",
            message_id
        );
        Ok(message_id)
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
        self.promote_delayed(queue).await?;

        // Blocking reads get their own connection so they never stall
        // commands pipelined on the shared one
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::dequeue_failed(e.to_string()))?;

        let block_ms = block.as_millis().max(1) as u64;
        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(max)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(self.stream_key(queue))
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let entries: Vec<StreamId> = reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default();

        Ok(self.parse_entries(queue, entries).await)
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.ack_id(&delivery.queue, &delivery.id).await
    }

    async fn nack(
        &self,
        delivery: &Delivery,
        error: &str,
        policy: &RetryPolicy,
    ) -> QueueResult<NackOutcome> {
        let mut conn = self.conn.clone();

        // Park or dead-letter before acking: a crash in between duplicates
        // the job rather than losing it
        let outcome = if policy.should_retry(delivery.attempt) {
            let delay = policy.delay_for_attempt(delivery.attempt);
            let next_attempt = delivery.attempt + 1;
            let ready_at = chrono::Utc::now().timestamp_millis() + delay.as_millis() as i64;
            let member = serde_json::to_string(&DelayedEntry {
                job: delivery.job.clone(),
                attempt: next_attempt,
            })?;
            conn.zadd::<_, _, _, ()>(self.delayed_key(&delivery.queue), member, ready_at)
                .await?;
            NackOutcome::Retry {
                next_attempt,
                delay,
            }
        } else {
            let payload = serde_json::to_string(&delivery.job)?;
            redis::cmd("XADD")
                .arg(self.dlq_key(&delivery.queue))
                .arg("*")
                .arg("job")
                .arg(&payload)
                .arg("error")
                .arg(error)
                .arg("original_id")
                .arg(&delivery.id)
                .arg("attempts")
                .arg(delivery.attempt)
                .query_async::<()>(&mut conn)
                .await?;
            warn!(
                queue = %delivery.queue,
                job_id = %delivery.job.job_id,
                "Moved job to DLQ: {}",
                error
            );
            NackOutcome::DeadLettered
        };

        self.ack_id(&delivery.queue, &delivery.id).await?;
        Ok(outcome)
    }

    async fn touch(&self, queue: &str, consumer: &str, ids: &[String]) -> QueueResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();

        // XCLAIM with zero idle time resets the entries' idle counters
        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(self.stream_key(queue))
            .arg(&self.consumer_group)
            .arg(consumer)
            .arg(0);
        for id in ids {
            cmd.arg(id);
        }
        cmd.arg("JUSTID").query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn claim_stalled(
        &self,
        queue: &str,
        consumer: &str,
        min_idle: Duration,
        max: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn.clone();

        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(self.stream_key(queue))
            .arg(&self.consumer_group)
            .arg(consumer)
            .arg(min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(max.max(1))
            .query_async(&mut conn)
            .await?;

        let deliveries = self.parse_entries(queue, reply.claimed).await;
        for delivery in &deliveries {
            info!(
                queue = queue,
                job_id = %delivery.job.job_id,
                "Claimed stalled job {}",
                delivery.id
            );
        }
        Ok(deliveries)
    }
}
