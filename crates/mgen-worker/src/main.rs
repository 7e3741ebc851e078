//! Media generation worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mgen_firestore::{FirestoreClient, FirestoreConfig, ProjectRepository};
use mgen_media::{check_ffmpeg, FfmpegMerger};
use mgen_queue::{QueueConfig, QueueManager};
use mgen_storage::{BlobStore, LocalBlobStore, LocalStorageConfig, R2Client, R2Config};
use mgen_worker::metrics::init_metrics;
use mgen_worker::{HttpGenerationProvider, ProjectStore, Runtime, Services, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("mgen=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting mgen-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        init_metrics(port).context("Failed to install metrics exporter")?;
        info!(port = port, "Metrics endpoint listening");
    }

    let manager = QueueManager::connect(QueueConfig::from_env())
        .await
        .context("Failed to connect job queues")?;

    if let Err(e) = check_ffmpeg() {
        warn!("FFmpeg unavailable, stitching jobs will fail: {}", e);
    }

    let services = Services {
        provider: Arc::new(
            HttpGenerationProvider::from_env().context("Failed to create generation provider")?,
        ),
        storage: storage_from_env().await?,
        merger: Arc::new(FfmpegMerger::new().with_timeout(config.merge_timeout)),
        projects: projects_from_env()?,
    };

    let mut runtime = Runtime::new(manager, config);
    runtime.start(&services).context("Failed to start workers")?;

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");

    runtime.shutdown().await;
    info!("Worker shutdown complete");
    Ok(())
}

async fn storage_from_env() -> anyhow::Result<Arc<dyn BlobStore>> {
    if R2Config::is_configured() {
        info!("Using R2 artifact storage");
        let client = R2Client::from_env().context("Invalid R2 configuration")?;
        if let Err(e) = client.check_connectivity().await {
            warn!("R2 bucket unreachable, uploads will fail until it recovers: {}", e);
        }
        Ok(Arc::new(client))
    } else {
        let config = LocalStorageConfig::from_env();
        info!(root = %config.root.display(), "Using local artifact storage");
        Ok(Arc::new(LocalBlobStore::new(config)))
    }
}

fn projects_from_env() -> anyhow::Result<Option<Arc<dyn ProjectStore>>> {
    if !FirestoreConfig::is_configured() {
        warn!("Firestore not configured, final video URLs will not be recorded on projects");
        return Ok(None);
    }
    let client = FirestoreClient::from_env().context("Failed to create Firestore client")?;
    Ok(Some(Arc::new(ProjectRepository::new(client))))
}
