//! Queue configuration and per-queue retry policy.

use std::collections::HashMap;
use std::time::Duration;

use mgen_models::JobType;
use tracing::warn;

/// Redelivery policy for a single queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first delivery
    pub max_attempts: u32,
    /// Base delay for exponential backoff (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Policy that never redelivers.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Whether a delivery that just failed on `attempt` (1-based) gets another try.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Backoff before the attempt following `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(2u32.pow(exponent));
        delay.min(self.max_delay)
    }
}

/// Settings for one named queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// Maximum processor invocations running at once
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl QueueSettings {
    /// Built-in defaults for a job type.
    pub fn defaults_for(job_type: JobType) -> Self {
        let (concurrency, max_attempts) = match job_type {
            JobType::CharacterImage | JobType::ObjectImage | JobType::ImageEdit => (10, 2),
            JobType::VideoGeneration => (30, 2),
            JobType::ContentPlanning => (5, 3),
            // Uploads and project writes are not idempotent
            JobType::VideoStitching => (1, 1),
        };
        Self {
            concurrency,
            retry: RetryPolicy::default().with_max_attempts(max_attempts),
        }
    }

    fn from_env(job_type: JobType) -> Self {
        let mut settings = Self::defaults_for(job_type);
        let key = job_type.env_key();

        if let Some(concurrency) = env_parse::<usize>(&format!("QUEUE_{}_CONCURRENCY", key)) {
            if concurrency == 0 {
                warn!(queue = %job_type, "Ignoring zero concurrency override");
            } else {
                settings.concurrency = concurrency;
            }
        }
        if let Some(max_attempts) = env_parse::<u32>(&format!("QUEUE_{}_MAX_ATTEMPTS", key)) {
            settings.retry = settings.retry.with_max_attempts(max_attempts);
        }
        if let Some(secs) = env_parse::<u64>("QUEUE_RETRY_BASE_DELAY_SECS") {
            settings.retry = settings.retry.with_base_delay(Duration::from_secs(secs));
        }
        settings
    }
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for every Redis key owned by the queues
    pub key_prefix: String,
    /// Consumer group name
    pub consumer_group: String,
    /// How long a fetch blocks waiting for jobs
    pub block_timeout: Duration,
    /// Minimum idle time before an unacknowledged delivery is reclaimed
    pub claim_min_idle: Duration,
    /// How long status records are retained
    pub status_ttl: Duration,
    /// Per-queue settings, one entry per job type
    pub queues: HashMap<JobType, QueueSettings>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "mgen".to_string(),
            consumer_group: "mgen:workers".to_string(),
            block_timeout: Duration::from_secs(5),
            claim_min_idle: Duration::from_secs(600), // 10 minutes
            status_ttl: Duration::from_secs(7 * 24 * 3600),
            queues: JobType::ALL
                .iter()
                .map(|t| (*t, QueueSettings::defaults_for(*t)))
                .collect(),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            block_timeout: env_parse("QUEUE_BLOCK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.block_timeout),
            claim_min_idle: env_parse("QUEUE_CLAIM_MIN_IDLE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_min_idle),
            status_ttl: env_parse("JOB_STATUS_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.status_ttl),
            queues: JobType::ALL
                .iter()
                .map(|t| (*t, QueueSettings::from_env(*t)))
                .collect(),
        }
    }

    /// Settings for a job type's queue.
    pub fn settings(&self, job_type: JobType) -> QueueSettings {
        self.queues
            .get(&job_type)
            .copied()
            .unwrap_or_else(|| QueueSettings::defaults_for(job_type))
    }

    /// Override one queue's settings.
    pub fn with_queue(mut self, job_type: JobType, settings: QueueSettings) -> Self {
        self.queues.insert(job_type, settings);
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
