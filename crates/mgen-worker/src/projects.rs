//! Project record updates made by workers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mgen_firestore::ProjectRepository;
use mgen_models::ProjectId;

use crate::error::WorkerResult;

/// Where finished project-level artifacts are recorded.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Point the project at its final stitched video.
    async fn update_project_final_video_url(
        &self,
        project_id: &ProjectId,
        url: &str,
        updated_at: DateTime<Utc>,
    ) -> WorkerResult<()>;
}

#[async_trait]
impl ProjectStore for ProjectRepository {
    async fn update_project_final_video_url(
        &self,
        project_id: &ProjectId,
        url: &str,
        updated_at: DateTime<Utc>,
    ) -> WorkerResult<()> {
        self.update_final_video_url(project_id, url, updated_at)
            .await?;
        Ok(())
    }
}
