//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root for per-job transient files
    pub work_dir: PathBuf,
    /// How long shutdown waits for in-flight jobs
    pub shutdown_timeout: Duration,
    /// How often each pool scans for stalled deliveries
    pub claim_interval: Duration,
    /// Consumer name inside the broker's consumer group
    pub consumer_name: String,
    /// Timeout for a single source download
    pub download_timeout: Duration,
    /// Kill the merge tool after this long
    pub merge_timeout: Duration,
    /// Port for the Prometheus scrape endpoint; disabled when `None`
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("mgen"),
            shutdown_timeout: Duration::from_secs(30),
            claim_interval: Duration::from_secs(30),
            consumer_name: format!("worker-{}", Uuid::new_v4()),
            download_timeout: Duration::from_secs(300),
            merge_timeout: Duration::from_secs(1800),
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            shutdown_timeout: secs("WORKER_SHUTDOWN_TIMEOUT", defaults.shutdown_timeout),
            claim_interval: secs("WORKER_CLAIM_INTERVAL_SECS", defaults.claim_interval),
            consumer_name: std::env::var("WORKER_CONSUMER_NAME")
                .unwrap_or(defaults.consumer_name),
            download_timeout: secs("WORKER_DOWNLOAD_TIMEOUT_SECS", defaults.download_timeout),
            merge_timeout: secs("WORKER_MERGE_TIMEOUT_SECS", defaults.merge_timeout),
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("WORKER_WORK_DIR", "/var/tmp/mgen-test");
        std::env::set_var("WORKER_SHUTDOWN_TIMEOUT", "5");
        std::env::set_var("METRICS_PORT", "9100");
        std::env::remove_var("WORKER_CONSUMER_NAME");

        let config = WorkerConfig::from_env();
        assert_eq!(config.work_dir, PathBuf::from("/var/tmp/mgen-test"));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.metrics_port, Some(9100));
        assert!(config.consumer_name.starts_with("worker-"));

        for key in ["WORKER_WORK_DIR", "WORKER_SHUTDOWN_TIMEOUT", "METRICS_PORT"] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        std::env::remove_var("METRICS_PORT");
        let config = WorkerConfig::from_env();
        assert_eq!(config.claim_interval, Duration::from_secs(30));
        assert!(config.metrics_port.is_none());
    }
}
