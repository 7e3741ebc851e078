//! Project records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::info;

use mgen_models::ProjectId;

use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::types::{FromFirestoreValue, ToFirestoreValue};

const PROJECTS_COLLECTION: &str = "projects";

const FINAL_VIDEO_URL: &str = "final_video_url";
const UPDATED_AT: &str = "updated_at";

/// Repository for the `projects` collection.
#[derive(Clone)]
pub struct ProjectRepository {
    client: FirestoreClient,
    collection: String,
}

impl ProjectRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self {
            client,
            collection: PROJECTS_COLLECTION.to_string(),
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Point the project at its final stitched video.
    ///
    /// Only `final_video_url` and `updated_at` are written. Fails with
    /// `NotFound` when the project does not exist.
    pub async fn update_final_video_url(
        &self,
        project_id: &ProjectId,
        url: &str,
        updated_at: DateTime<Utc>,
    ) -> FirestoreResult<()> {
        let fields = HashMap::from([
            (FINAL_VIDEO_URL.to_string(), url.to_firestore_value()),
            (UPDATED_AT.to_string(), updated_at.to_firestore_value()),
        ]);

        self.client
            .update_document(
                &self.collection,
                project_id.as_str(),
                fields,
                Some(&[FINAL_VIDEO_URL, UPDATED_AT][..]),
                true,
            )
            .await?;

        info!(project_id = %project_id, "Updated project final video URL");
        Ok(())
    }

    /// Current final video URL, if the project exists and has one.
    pub async fn get_final_video_url(&self, project_id: &ProjectId) -> FirestoreResult<Option<String>> {
        let doc = self
            .client
            .get_document(&self.collection, project_id.as_str())
            .await?;

        Ok(doc
            .as_ref()
            .and_then(|d| d.field(FINAL_VIDEO_URL))
            .and_then(String::from_firestore_value))
    }
}
