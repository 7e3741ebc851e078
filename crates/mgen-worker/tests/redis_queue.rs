//! End-to-end runs over Redis Streams.
//!
//! Run with `REDIS_URL` pointing at a disposable Redis and `--ignored`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use mgen_models::{JobStatus, JobType, ProjectId};
use mgen_queue::{
    QueueConfig, QueueManager, QueueSettings, RedisStatusStore, RedisStreamBroker, RetryPolicy,
    WorkerEventKind,
};
use mgen_worker::{JobContext, JobProcessor, Runtime, WorkerConfig, WorkerError, WorkerResult};

fn config() -> QueueConfig {
    QueueConfig {
        redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into()),
        key_prefix: format!("mgen-test-{}", uuid::Uuid::new_v4()),
        block_timeout: Duration::from_millis(100),
        ..QueueConfig::default()
    }
}

fn worker_config() -> WorkerConfig {
    WorkerConfig {
        shutdown_timeout: Duration::from_secs(5),
        claim_interval: Duration::from_secs(3600),
        ..WorkerConfig::default()
    }
}

struct EchoProcessor;

#[async_trait]
impl JobProcessor for EchoProcessor {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn process(&self, ctx: &JobContext) -> WorkerResult<Value> {
        ctx.progress(50, "echoing").await;
        Ok(json!({"echo": ctx.job().input_data.clone()}))
    }
}

struct AlwaysFails;

#[async_trait]
impl JobProcessor for AlwaysFails {
    fn name(&self) -> &'static str {
        "always-fails"
    }

    async fn process(&self, _ctx: &JobContext) -> WorkerResult<Value> {
        Err(WorkerError::provider("model unavailable", true))
    }
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn job_completes_over_redis() {
    let manager = QueueManager::connect(config()).await.unwrap();
    let mut events = manager.events().subscribe();
    let mut runtime = Runtime::new(manager.clone(), worker_config());
    runtime
        .start_worker(JobType::ContentPlanning, Arc::new(EchoProcessor))
        .unwrap();

    let job_id = manager
        .enqueue(
            JobType::ContentPlanning,
            ProjectId::new("p1"),
            json!({"prompt": "tides"}),
        )
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .unwrap()
        .unwrap();
    runtime.shutdown().await;

    assert_eq!(event.kind, WorkerEventKind::Completed);
    let record = manager.get_job_status(&job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.output_data.unwrap()["echo"]["prompt"], "tides");
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn exhausted_job_lands_in_dead_letter_stream() {
    let config = config().with_queue(
        JobType::VideoGeneration,
        QueueSettings {
            concurrency: 2,
            retry: RetryPolicy::default()
                .with_max_attempts(2)
                .with_base_delay(Duration::from_millis(10)),
        },
    );
    let broker = RedisStreamBroker::connect(&config).await.unwrap();
    let store = RedisStatusStore::new(
        broker.connection(),
        config.key_prefix.clone(),
        config.status_ttl,
    );
    let inspector = RedisStreamBroker::connect(&config).await.unwrap();
    let manager = QueueManager::new(Arc::new(broker), Arc::new(store), config);
    manager.init().await.unwrap();
    let mut events = manager.events().subscribe();

    let mut runtime = Runtime::new(manager.clone(), worker_config());
    runtime
        .start_worker(JobType::VideoGeneration, Arc::new(AlwaysFails))
        .unwrap();

    let job_id = manager
        .enqueue(JobType::VideoGeneration, ProjectId::new("p1"), json!({"prompt": "p"}))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.unwrap();
            if matches!(
                event.kind,
                WorkerEventKind::Failed {
                    will_retry: false,
                    ..
                }
            ) {
                break;
            }
        }
    })
    .await
    .unwrap();
    runtime.shutdown().await;

    let record = manager.get_job_status(&job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("model unavailable"));
    assert_eq!(
        inspector
            .dlq_len(JobType::VideoGeneration.as_str())
            .await
            .unwrap(),
        1
    );
}
