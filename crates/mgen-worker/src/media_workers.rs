//! Image, video and planning workers.
//!
//! All three follow the same checkpoints: 10 once the input is accepted,
//! 30 right before the provider call, 90 once the result is back. The pool
//! records completion and progress 100.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use mgen_models::{ImageJobInput, JobType, PlanningJobInput, VideoJobInput};

use crate::context::JobContext;
use crate::error::{WorkerError, WorkerResult};
use crate::processor::JobProcessor;
use crate::provider::{GeneratedArtifact, GenerationKind, GenerationProvider, GenerationRequest};

/// Call the transform variant when a seed is present, create otherwise.
async fn generate(
    provider: &dyn GenerationProvider,
    request: &GenerationRequest,
    seed_url: Option<&str>,
) -> WorkerResult<GeneratedArtifact> {
    match seed_url {
        Some(url) => provider.transform(request, url).await,
        None => provider.create(request).await,
    }
}

fn artifact_url(artifact: GeneratedArtifact) -> WorkerResult<String> {
    artifact
        .url
        .ok_or_else(|| WorkerError::processing("Provider returned no artifact URL"))
}

/// Character, object and edited images.
pub struct ImageProcessor {
    job_type: JobType,
    provider: Arc<dyn GenerationProvider>,
}

impl ImageProcessor {
    pub fn new(job_type: JobType, provider: Arc<dyn GenerationProvider>) -> Self {
        Self { job_type, provider }
    }
}

#[async_trait]
impl JobProcessor for ImageProcessor {
    fn name(&self) -> &'static str {
        self.job_type.as_str()
    }

    async fn process(&self, ctx: &JobContext) -> WorkerResult<Value> {
        ctx.progress(10, "input accepted").await;

        let input: ImageJobInput = ctx.input()?;
        if self.job_type == JobType::ImageEdit && input.image_url.is_none() {
            return Err(WorkerError::validation("image_url is required for image-edit"));
        }

        let options = json!({
            "job_type": self.job_type,
            "name": input.name,
            "style": input.style,
            "aspect_ratio": input.aspect_ratio,
        });
        let request = GenerationRequest {
            kind: GenerationKind::Image,
            prompt: input.prompt.clone(),
            options: options.clone(),
        };

        ctx.progress(30, "generating image").await;
        let artifact = generate(
            self.provider.as_ref(),
            &request,
            input.image_url.as_deref(),
        )
        .await?;
        let image_url = artifact_url(artifact)?;
        ctx.progress(90, "image generated").await;

        let mut output = json!({
            "image_url": image_url,
            "prompt": input.prompt,
            "options": options,
            "generated_at": Utc::now(),
        });
        if let Some(source) = input.image_url {
            output["source_image_url"] = json!(source);
        }
        Ok(output)
    }
}

/// Video clips, optionally animated from a seed image.
pub struct VideoProcessor {
    provider: Arc<dyn GenerationProvider>,
}

impl VideoProcessor {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl JobProcessor for VideoProcessor {
    fn name(&self) -> &'static str {
        JobType::VideoGeneration.as_str()
    }

    async fn process(&self, ctx: &JobContext) -> WorkerResult<Value> {
        ctx.progress(10, "input accepted").await;
        let input: VideoJobInput = ctx.input()?;

        let options = serde_json::to_value(&input.options)
            .map_err(|e| WorkerError::processing(e.to_string()))?;
        let request = GenerationRequest {
            kind: GenerationKind::Video,
            prompt: input.prompt.clone(),
            options: options.clone(),
        };

        ctx.progress(30, "generating video").await;
        let artifact = generate(
            self.provider.as_ref(),
            &request,
            input.image_url.as_deref(),
        )
        .await?;
        let video_url = artifact_url(artifact)?;
        ctx.progress(90, "video generated").await;

        let mut output = json!({
            "video_url": video_url,
            "prompt": input.prompt,
            "options": options,
            "generated_at": Utc::now(),
        });
        if let Some(image_url) = input.image_url {
            output["image_url"] = json!(image_url);
        }
        if let Some(scene_id) = input.scene_id {
            output["scene_id"] = json!(scene_id);
        }
        Ok(output)
    }
}

/// Content plans derived from a brief.
pub struct PlanningProcessor {
    provider: Arc<dyn GenerationProvider>,
}

impl PlanningProcessor {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl JobProcessor for PlanningProcessor {
    fn name(&self) -> &'static str {
        JobType::ContentPlanning.as_str()
    }

    async fn process(&self, ctx: &JobContext) -> WorkerResult<Value> {
        ctx.progress(10, "input accepted").await;
        let input: PlanningJobInput = ctx.input()?;

        let options = json!({
            "scene_count": input.scene_count,
            "style": input.style,
            "target_duration_seconds": input.target_duration_seconds,
        });
        let request = GenerationRequest {
            kind: GenerationKind::Plan,
            prompt: input.prompt.clone(),
            options: options.clone(),
        };

        ctx.progress(30, "planning content").await;
        let plan = self
            .provider
            .create(&request)
            .await?
            .document
            .ok_or_else(|| WorkerError::processing("Provider returned no plan"))?;
        ctx.progress(90, "plan generated").await;

        Ok(json!({
            "plan": plan,
            "prompt": input.prompt,
            "options": options,
            "generated_at": Utc::now(),
        }))
    }
}
