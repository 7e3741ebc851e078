//! Shared data models for the media generation job system.
//!
//! This crate provides Serde-serializable types for:
//! - Job identifiers and job types
//! - Job status records and the status state machine
//! - Artifact asset types
//! - Typed input payloads for every job type

pub mod asset;
pub mod job;
pub mod job_status;
pub mod payload;

// Re-export common types
pub use asset::AssetType;
pub use job::{JobId, JobType, ProjectId};
pub use job_status::{JobStatus, JobStatusRecord, StatusUpdate, TransitionError};
pub use payload::{
    ImageJobInput, MergeOptions, PlanningJobInput, StitchJobInput, Transition, TransitionKind,
    VideoGenerationOptions, VideoJobInput, SUPPORTED_OUTPUT_FORMATS,
};
