//! Worker runtime: one pool per queue over a shared queue manager.
//!
//! Lifecycle is init, start workers, wait for a shutdown signal, drain.

use std::sync::Arc;

use futures::future::join_all;
use reqwest::Client;
use tokio::task::JoinHandle;
use tracing::info;

use mgen_media::VideoMerger;
use mgen_models::JobType;
use mgen_queue::QueueManager;
use mgen_storage::BlobStore;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::media_workers::{ImageProcessor, PlanningProcessor, VideoProcessor};
use crate::pool::{WorkerHandle, WorkerPool};
use crate::processor::JobProcessor;
use crate::projects::ProjectStore;
use crate::provider::GenerationProvider;
use crate::stitching::StitchingProcessor;

/// External collaborators the processors are built from.
#[derive(Clone)]
pub struct Services {
    pub provider: Arc<dyn GenerationProvider>,
    pub storage: Arc<dyn BlobStore>,
    pub merger: Arc<dyn VideoMerger>,
    /// Project record store; the final video URL is not recorded without one
    pub projects: Option<Arc<dyn ProjectStore>>,
}

pub struct Runtime {
    manager: QueueManager,
    config: WorkerConfig,
    workers: Vec<WorkerHandle>,
    event_logger: JoinHandle<()>,
}

impl Runtime {
    /// Takes an initialized manager and starts logging its events.
    pub fn new(manager: QueueManager, config: WorkerConfig) -> Self {
        let event_logger = manager.events().spawn_logger();
        Self {
            manager,
            config,
            workers: Vec::new(),
            event_logger,
        }
    }

    /// Start a pool for every job type.
    pub fn start(&mut self, services: &Services) -> WorkerResult<()> {
        let http = Client::builder()
            .user_agent(concat!("mgen-worker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        for job_type in [
            JobType::CharacterImage,
            JobType::ObjectImage,
            JobType::ImageEdit,
        ] {
            self.start_worker(
                job_type,
                Arc::new(ImageProcessor::new(job_type, Arc::clone(&services.provider))),
            )?;
        }
        self.start_worker(
            JobType::VideoGeneration,
            Arc::new(VideoProcessor::new(Arc::clone(&services.provider))),
        )?;
        self.start_worker(
            JobType::ContentPlanning,
            Arc::new(PlanningProcessor::new(Arc::clone(&services.provider))),
        )?;

        let mut stitching = StitchingProcessor::new(
            http,
            Arc::clone(&services.merger),
            Arc::clone(&services.storage),
            self.config.work_dir.clone(),
        )
        .with_download_timeout(self.config.download_timeout);
        if let Some(projects) = &services.projects {
            stitching = stitching.with_projects(Arc::clone(projects));
        }
        self.start_worker(JobType::VideoStitching, Arc::new(stitching))?;

        info!(workers = self.workers.len(), "All workers started");
        Ok(())
    }

    /// Start a pool running `processor` on the queue for `job_type`.
    pub fn start_worker(
        &mut self,
        job_type: JobType,
        processor: Arc<dyn JobProcessor>,
    ) -> WorkerResult<()> {
        let queue = self.manager.queue(job_type)?;
        let handle = WorkerPool::new(&self.manager, queue, processor, &self.config).start();
        self.workers.push(handle);
        Ok(())
    }

    pub fn manager(&self) -> &QueueManager {
        &self.manager
    }

    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    /// Stop every pool and wait for in-flight jobs to drain.
    pub async fn shutdown(self) {
        info!(workers = self.workers.len(), "Shutting down workers");

        for worker in &self.workers {
            worker.signal_shutdown();
        }
        join_all(self.workers.into_iter().map(WorkerHandle::join)).await;

        self.event_logger.abort();
        info!("All workers stopped");
    }
}
