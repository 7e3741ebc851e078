//! Job identifiers and job types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the project that owns a job and its artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type of job. Each type is served by exactly one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    /// Generate a character reference image
    CharacterImage,
    /// Generate an object/prop image
    ObjectImage,
    /// Edit an existing image
    ImageEdit,
    /// Generate a video clip, optionally from a seed image
    VideoGeneration,
    /// Produce a content plan (scenes, shots) from a brief
    ContentPlanning,
    /// Concatenate several generated videos into one
    VideoStitching,
}

impl JobType {
    /// Every job type, in queue creation order.
    pub const ALL: [JobType; 6] = [
        JobType::CharacterImage,
        JobType::ObjectImage,
        JobType::ImageEdit,
        JobType::VideoGeneration,
        JobType::ContentPlanning,
        JobType::VideoStitching,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::CharacterImage => "character-image",
            JobType::ObjectImage => "object-image",
            JobType::ImageEdit => "image-edit",
            JobType::VideoGeneration => "video-generation",
            JobType::ContentPlanning => "content-planning",
            JobType::VideoStitching => "video-stitching",
        }
    }

    /// Suffix used for per-queue environment variables (e.g. `VIDEO_STITCHING`).
    pub fn env_key(&self) -> String {
        self.as_str().replace('-', "_").to_uppercase()
    }

    /// Returns true for the image-producing job types.
    pub fn is_image(&self) -> bool {
        matches!(
            self,
            JobType::CharacterImage | JobType::ObjectImage | JobType::ImageEdit
        )
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown job type: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_names_match_serde() {
        for job_type in JobType::ALL {
            let json = serde_json::to_string(&job_type).unwrap();
            assert_eq!(json, format!("\"{}\"", job_type.as_str()));
            assert_eq!(job_type.as_str().parse::<JobType>().unwrap(), job_type);
        }
    }

    #[test]
    fn test_env_key() {
        assert_eq!(JobType::VideoStitching.env_key(), "VIDEO_STITCHING");
        assert_eq!(JobType::ImageEdit.env_key(), "IMAGE_EDIT");
    }

    #[test]
    fn test_unknown_job_type() {
        assert!("audio-generation".parse::<JobType>().is_err());
    }
}
