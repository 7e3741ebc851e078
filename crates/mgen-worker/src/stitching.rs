//! Stitching worker: merge generated videos into the project's final video.
//!
//! Downloads the inputs in order into a per-job transient directory, merges
//! them, uploads the result and links it to the project. Every transient
//! file is removed on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use mgen_media::{TransientFiles, VideoMerger};
use mgen_models::{AssetType, JobType, StitchJobInput};
use mgen_storage::{content_type_for, generate_filename, BlobStore};

use crate::context::JobContext;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::processor::JobProcessor;
use crate::projects::ProjectStore;

/// Progress once all downloads are done.
const DOWNLOADS_DONE: usize = 40;

pub struct StitchingProcessor {
    http: Client,
    merger: Arc<dyn VideoMerger>,
    storage: Arc<dyn BlobStore>,
    projects: Option<Arc<dyn ProjectStore>>,
    work_dir: PathBuf,
    download_timeout: Duration,
}

impl StitchingProcessor {
    pub fn new(
        http: Client,
        merger: Arc<dyn VideoMerger>,
        storage: Arc<dyn BlobStore>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            http,
            merger,
            storage,
            projects: None,
            work_dir: work_dir.into(),
            download_timeout: Duration::from_secs(300),
        }
    }

    /// Record the final video URL on the project after upload.
    pub fn with_projects(mut self, projects: Arc<dyn ProjectStore>) -> Self {
        self.projects = Some(projects);
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    async fn stitch(
        &self,
        ctx: &JobContext,
        input: &StitchJobInput,
        files: &mut TransientFiles,
    ) -> WorkerResult<Value> {
        let count = input.video_urls.len();
        let extension = input.options.extension();

        let started = Instant::now();
        let mut inputs = Vec::with_capacity(count);
        for (index, url) in input.video_urls.iter().enumerate() {
            let path = files.track(&format!("input_{}.mp4", index));
            self.download(url, &path).await?;
            inputs.push(path);

            let progress = 10 + (index + 1) * (DOWNLOADS_DONE - 10) / count;
            ctx.progress(
                progress as u8,
                &format!("downloaded video {}/{}", index + 1, count),
            )
            .await;
        }
        metrics::record_download_duration(started.elapsed().as_secs_f64());

        let output = files.track(&format!("merged.{}", extension));
        for scratch in self.merger.scratch_paths(&output) {
            files.track_path(scratch);
        }

        ctx.progress(DOWNLOADS_DONE as u8, "merging videos").await;
        let started = Instant::now();
        self.merger
            .merge(&inputs, &output, &input.options)
            .await
            .map_err(|e| WorkerError::processing(e.to_string()))?;
        metrics::record_merge_duration(started.elapsed().as_secs_f64());

        ctx.progress(80, "uploading merged video").await;
        let data = tokio::fs::read(&output).await?;
        let filename = generate_filename(input.output_name.as_deref(), extension);
        let started = Instant::now();
        let stored = self
            .storage
            .save(
                ctx.project_id(),
                AssetType::Videos,
                &filename,
                data,
                content_type_for(&filename),
            )
            .await?;
        metrics::record_upload_duration(started.elapsed().as_secs_f64());

        ctx.progress(95, "updating project").await;
        self.link_to_project(ctx, &stored.url).await;

        Ok(json!({
            "video_url": stored.url,
            "filename": filename,
            "video_urls": input.video_urls,
            "video_count": count,
            "options": input.options,
            "completed_at": Utc::now(),
        }))
    }

    async fn download(&self, url: &str, path: &Path) -> WorkerResult<()> {
        debug!(url = %url, path = %path.display(), "Downloading video");

        let response = self
            .http
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| WorkerError::download(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkerError::download(format!(
                "{} returned {}",
                url, status
            )));
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| WorkerError::download(format!("{}: {}", url, e)))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    /// Best effort: the job still succeeds when this fails.
    async fn link_to_project(&self, ctx: &JobContext, url: &str) {
        let Some(projects) = &self.projects else {
            return;
        };
        if let Err(e) = projects
            .update_project_final_video_url(ctx.project_id(), url, Utc::now())
            .await
        {
            ctx.logger()
                .log_warning(&format!("Failed to update project final video URL: {}", e));
        }
    }
}

#[async_trait]
impl JobProcessor for StitchingProcessor {
    fn name(&self) -> &'static str {
        JobType::VideoStitching.as_str()
    }

    async fn process(&self, ctx: &JobContext) -> WorkerResult<Value> {
        ctx.progress(10, "input accepted").await;

        let input: StitchJobInput = ctx.input()?;
        let invalid = input.invalid_urls();
        if !invalid.is_empty() {
            return Err(WorkerError::validation(format!(
                "video_urls must be http(s) URLs: {}",
                invalid.join(", ")
            )));
        }

        let namespace = format!("stitch_{}", ctx.job_id());
        let mut files = TransientFiles::create(&self.work_dir, &namespace).await?;

        let result = self.stitch(ctx, &input, &mut files).await;

        let removed = files.cleanup().await;
        debug!(job_id = %ctx.job_id(), removed = removed, "Removed transient files");

        result
    }
}
