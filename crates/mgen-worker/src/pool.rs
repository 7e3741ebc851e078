//! Worker pool: runs one queue's processor with bounded concurrency.
//!
//! The pool holds one semaphore permit per running job. It blocks on a
//! permit before fetching, then blocks on the broker fetch, so an idle pool
//! never spins. A separate task reclaims deliveries abandoned by dead
//! consumers; deliveries this pool is still running are kept fresh on the
//! broker and never reclaimed by it. On shutdown both loops stop and the pool waits for every
//! permit to come back, bounded by the shutdown timeout.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use mgen_models::{JobStatusRecord, JobType, StatusUpdate};
use mgen_queue::{
    Delivery, EventBus, JobBroker, JobStatusTracker, QueueHandle, QueueManager, RetryPolicy,
    WorkerEvent,
};

use crate::config::WorkerConfig;
use crate::context::JobContext;
use crate::metrics;
use crate::processor::{JobOutcome, JobProcessor};

/// Pause after a failed fetch before trying again.
const FETCH_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// A running pool. Dropping the handle stops it without waiting for the drain.
pub struct WorkerHandle {
    job_type: JobType,
    concurrency: usize,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Ask the pool to stop fetching. In-flight jobs keep running.
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the pool to finish draining.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(queue = %self.job_type, "Worker task ended abnormally: {}", e);
        }
    }

    pub async fn shutdown(self) {
        self.signal_shutdown();
        self.join().await;
    }
}

/// Everything a job task needs, shared between the loops.
struct Shared {
    queue: QueueHandle,
    processor: Arc<dyn JobProcessor>,
    broker: Arc<dyn JobBroker>,
    tracker: JobStatusTracker,
    events: EventBus,
    permits: Arc<Semaphore>,
    /// Broker ids of deliveries currently executing
    in_flight: Mutex<HashSet<String>>,
}

pub struct WorkerPool {
    shared: Arc<Shared>,
    consumer: String,
    block_timeout: Duration,
    claim_interval: Duration,
    claim_min_idle: Duration,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    pub fn new(
        manager: &QueueManager,
        queue: QueueHandle,
        processor: Arc<dyn JobProcessor>,
        config: &WorkerConfig,
    ) -> Self {
        let shared = Shared {
            queue,
            processor,
            broker: manager.broker(),
            tracker: manager.tracker().clone(),
            events: manager.events().clone(),
            permits: Arc::new(Semaphore::new(queue.concurrency())),
            in_flight: Mutex::new(HashSet::new()),
        };

        Self {
            shared: Arc::new(shared),
            consumer: config.consumer_name.clone(),
            block_timeout: manager.config().block_timeout,
            claim_interval: config.claim_interval,
            claim_min_idle: manager.config().claim_min_idle,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Start the fetch and reclaim loops.
    pub fn start(self) -> WorkerHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let job_type = self.shared.queue.job_type();
        let concurrency = self.shared.queue.concurrency();

        info!(
            queue = %job_type,
            processor = self.shared.processor.name(),
            concurrency = concurrency,
            consumer = %self.consumer,
            "Starting worker"
        );

        let task = tokio::spawn(self.run(shutdown_rx));
        WorkerHandle {
            job_type,
            concurrency,
            shutdown,
            task,
        }
    }

    async fn run(self, shutdown: watch::Receiver<bool>) {
        let claim_task = tokio::spawn(Self::claim_loop(
            Arc::clone(&self.shared),
            self.consumer.clone(),
            self.claim_interval,
            self.claim_min_idle,
            shutdown.clone(),
        ));

        self.fetch_loop(shutdown).await;

        if let Err(e) = claim_task.await {
            warn!(queue = %self.shared.queue.job_type(), "Claim task ended abnormally: {}", e);
        }
        self.drain().await;
    }

    async fn fetch_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let shared = &self.shared;
        let name = shared.queue.name();

        loop {
            let permit = tokio::select! {
                _ = stop_requested(&mut shutdown) => break,
                permit = Arc::clone(&shared.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            // One slot is already held; take whatever else is free
            let max = 1 + shared.permits.available_permits();
            let fetched = tokio::select! {
                _ = stop_requested(&mut shutdown) => break,
                fetched = shared.broker.fetch(name, &self.consumer, max, self.block_timeout) => fetched,
            };

            let deliveries = match fetched {
                Ok(deliveries) => deliveries,
                Err(e) => {
                    shared.events.emit(WorkerEvent::error(
                        shared.queue.job_type(),
                        None,
                        format!("Fetch failed: {}", e),
                    ));
                    drop(permit);
                    tokio::select! {
                        _ = stop_requested(&mut shutdown) => break,
                        _ = tokio::time::sleep(FETCH_ERROR_BACKOFF) => continue,
                    }
                }
            };

            if !deliveries.is_empty() {
                debug!(queue = name, count = deliveries.len(), "Fetched jobs");
            }

            let mut held = Some(permit);
            for delivery in deliveries {
                let permit = match held.take() {
                    Some(permit) => permit,
                    None => match Arc::clone(&shared.permits).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };
                Self::spawn_job(Arc::clone(shared), delivery, permit).await;
            }
        }

        info!(queue = name, "Worker stopped fetching");
    }

    async fn claim_loop(
        shared: Arc<Shared>,
        consumer: String,
        interval: Duration,
        min_idle: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; nothing can be stale yet
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = stop_requested(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            let running: Vec<String> = shared.in_flight.lock().await.iter().cloned().collect();
            if let Err(e) = shared
                .broker
                .touch(shared.queue.name(), &consumer, &running)
                .await
            {
                warn!(queue = shared.queue.name(), "Failed to refresh running jobs: {}", e);
            }

            let available = shared.permits.available_permits();
            if available == 0 {
                continue;
            }

            let claimed = match shared
                .broker
                .claim_stalled(shared.queue.name(), &consumer, min_idle, available)
                .await
            {
                Ok(claimed) => claimed,
                Err(e) => {
                    warn!(queue = shared.queue.name(), "Failed to claim stalled jobs: {}", e);
                    continue;
                }
            };

            for delivery in claimed {
                if shared.in_flight.lock().await.contains(&delivery.id) {
                    debug!(
                        queue = shared.queue.name(),
                        job_id = %delivery.job.job_id,
                        "Claimed job is still running here, leaving it"
                    );
                    continue;
                }

                shared.events.emit(WorkerEvent::stalled(
                    shared.queue.job_type(),
                    delivery.job.job_id.clone(),
                ));
                metrics::record_job_stalled(shared.queue.job_type());

                let permit = match Arc::clone(&shared.permits).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                Self::spawn_job(Arc::clone(&shared), delivery, permit).await;
            }
        }
    }

    async fn spawn_job(shared: Arc<Shared>, delivery: Delivery, permit: OwnedSemaphorePermit) {
        // Registered before the task starts so a concurrent claim tick sees it
        if !shared.in_flight.lock().await.insert(delivery.id.clone()) {
            return;
        }
        tokio::spawn(async move {
            let _permit = permit;
            let id = delivery.id.clone();
            shared.execute(delivery).await;
            shared.in_flight.lock().await.remove(&id);
        });
    }

    /// Wait for in-flight jobs by reacquiring every permit.
    async fn drain(&self) {
        let job_type = self.shared.queue.job_type();
        let total = self.shared.queue.concurrency() as u32;
        let in_flight = total as usize - self.shared.permits.available_permits();
        if in_flight > 0 {
            info!(queue = %job_type, in_flight = in_flight, "Waiting for in-flight jobs");
        }

        match tokio::time::timeout(
            self.shutdown_timeout,
            self.shared.permits.acquire_many(total),
        )
        .await
        {
            Ok(_) => info!(queue = %job_type, "Worker stopped"),
            Err(_) => warn!(
                queue = %job_type,
                timeout_secs = self.shutdown_timeout.as_secs(),
                "Shutdown timed out with jobs still running"
            ),
        }
    }
}

impl Shared {
    async fn execute(&self, delivery: Delivery) {
        let job = &delivery.job;
        let job_type = self.queue.job_type();

        match self.tracker.get_job_status(&job.job_id).await {
            Ok(Some(record)) if record.is_terminal() => {
                info!(
                    job_id = %job.job_id,
                    queue = %job_type,
                    status = %record.status,
                    "Skipping redelivered job that already finished"
                );
                self.ack(&delivery).await;
                return;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(job_id = %job.job_id, queue = %job_type, "No status record for job, creating one");
                let record =
                    JobStatusRecord::new(job.job_id.clone(), job.job_type, job.project_id.clone());
                if let Err(e) = self.tracker.create(&record).await {
                    warn!(job_id = %job.job_id, "Failed to create status record: {}", e);
                }
            }
            Err(e) => warn!(job_id = %job.job_id, "Failed to read job status: {}", e),
        }

        if let Err(e) = self
            .tracker
            .update_job_status(&job.job_id, StatusUpdate::progress(0))
            .await
        {
            warn!(job_id = %job.job_id, "Failed to mark job processing: {}", e);
        }
        metrics::record_job_started(job_type);

        let ctx = JobContext::new(job.clone(), delivery.attempt, self.tracker.clone());
        ctx.logger().log_start(&format!(
            "{} (attempt {})",
            self.processor.name(),
            delivery.attempt
        ));

        let started = Instant::now();
        let outcome = JobOutcome::from(
            self.processor
                .process(&ctx)
                .instrument(ctx.logger().create_span())
                .await,
        );
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            JobOutcome::Success(output) => {
                if let Err(e) = self
                    .tracker
                    .update_job_status(&job.job_id, StatusUpdate::completed(output))
                    .await
                {
                    warn!(job_id = %job.job_id, "Failed to mark job completed: {}", e);
                }
                self.ack(&delivery).await;
                metrics::record_job_completed(job_type, elapsed);
                self.events
                    .emit(WorkerEvent::completed(job_type, job.job_id.clone()));
            }
            JobOutcome::Failure { message, retryable } => {
                let policy = if retryable {
                    *self.queue.retry()
                } else {
                    RetryPolicy::no_retry()
                };

                let will_retry = match self.broker.nack(&delivery, &message, &policy).await {
                    Ok(outcome) => outcome.will_retry(),
                    Err(e) => {
                        self.events.emit(WorkerEvent::error(
                            job_type,
                            Some(job.job_id.clone()),
                            format!("Failed to reject delivery: {}", e),
                        ));
                        false
                    }
                };

                // Retried jobs stay `processing` so progress carries over
                if !will_retry {
                    if let Err(e) = self
                        .tracker
                        .update_job_status(&job.job_id, StatusUpdate::failed(message.clone()))
                        .await
                    {
                        warn!(job_id = %job.job_id, "Failed to mark job failed: {}", e);
                    }
                }
                metrics::record_job_failed(job_type, will_retry, elapsed);
                self.events.emit(WorkerEvent::failed(
                    job_type,
                    job.job_id.clone(),
                    message,
                    will_retry,
                ));
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) {
        if let Err(e) = self.broker.ack(delivery).await {
            self.events.emit(WorkerEvent::error(
                self.queue.job_type(),
                Some(delivery.job.job_id.clone()),
                format!("Failed to acknowledge delivery: {}", e),
            ));
        }
    }
}

/// Resolves once shutdown is requested or the handle is gone.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
