//! Media generation workers.
//!
//! This crate provides:
//! - A worker pool per queue with bounded concurrency
//! - Image, video and planning workers over a generation provider
//! - The stitching worker (download, merge, upload, link to project)
//! - Per-job progress reporting and logging
//! - Graceful shutdown

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod media_workers;
pub mod metrics;
pub mod pool;
pub mod processor;
pub mod projects;
pub mod provider;
pub mod runtime;
pub mod stitching;

pub use config::WorkerConfig;
pub use context::JobContext;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use media_workers::{ImageProcessor, PlanningProcessor, VideoProcessor};
pub use pool::{WorkerHandle, WorkerPool};
pub use processor::{JobOutcome, JobProcessor};
pub use projects::ProjectStore;
pub use provider::{
    GeneratedArtifact, GenerationKind, GenerationProvider, GenerationRequest,
    HttpGenerationProvider, ProviderConfig,
};
pub use runtime::{Runtime, Services};
pub use stitching::StitchingProcessor;
