//! Typed input payloads for each job type.
//!
//! Producers enqueue opaque JSON; workers decode it into these types and
//! validate it before doing any work.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Input for `character-image`, `object-image` and `image-edit` jobs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct ImageJobInput {
    /// Description of the image to produce
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub prompt: String,
    /// Display name of the character or object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Visual style hint passed to the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Requested aspect ratio (provider default when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    /// Existing image to transform; required for `image-edit`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url(message = "image_url must be a valid URL"))]
    pub image_url: Option<String>,
}

/// Input for `video-generation` jobs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct VideoJobInput {
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub prompt: String,
    /// Seed frame; when present the video is animated from this image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url(message = "image_url must be a valid URL"))]
    pub image_url: Option<String>,
    /// Scene this clip belongs to, echoed back in the output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub options: VideoGenerationOptions,
}

/// Generation options for video jobs. Every field falls back to its default
/// when omitted from the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct VideoGenerationOptions {
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_duration_seconds")]
    #[validate(range(min = 1, max = 60, message = "duration_seconds must be between 1 and 60"))]
    pub duration_seconds: u32,
    #[serde(default = "default_generate_audio")]
    pub generate_audio: bool,
    #[serde(default = "default_resolution")]
    pub resolution: String,
}

fn default_aspect_ratio() -> String {
    "16:9".to_string()
}

fn default_duration_seconds() -> u32 {
    8
}

fn default_generate_audio() -> bool {
    true
}

fn default_resolution() -> String {
    "720p".to_string()
}

impl Default for VideoGenerationOptions {
    fn default() -> Self {
        Self {
            aspect_ratio: default_aspect_ratio(),
            duration_seconds: default_duration_seconds(),
            generate_audio: default_generate_audio(),
            resolution: default_resolution(),
        }
    }
}

/// Input for `content-planning` jobs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct PlanningJobInput {
    /// Creative brief the plan is derived from
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 50, message = "scene_count must be between 1 and 50"))]
    pub scene_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_duration_seconds: Option<u32>,
}

/// Input for `video-stitching` jobs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct StitchJobInput {
    /// Videos to merge, in playback order
    #[validate(length(min = 1, message = "video_urls must not be empty"))]
    pub video_urls: Vec<String>,
    /// Base name for the merged file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub options: MergeOptions,
}

impl StitchJobInput {
    /// Entries of `video_urls` that are not absolute http(s) URLs.
    pub fn invalid_urls(&self) -> Vec<&str> {
        self.video_urls
            .iter()
            .filter(|u| {
                url::Url::parse(u)
                    .map(|parsed| !matches!(parsed.scheme(), "http" | "https"))
                    .unwrap_or(true)
            })
            .map(String::as_str)
            .collect()
    }
}

/// Containers the merged video can be written as.
pub const SUPPORTED_OUTPUT_FORMATS: &[&str] = &["mp4", "mov", "webm", "mkv"];

/// Options passed through to the merge tool unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct MergeOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,
    /// Output container extension, with or without a leading dot
    #[serde(default = "default_output_format")]
    #[validate(custom(function = "validate_output_format"))]
    pub output_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
}

fn default_output_format() -> String {
    "mp4".to_string()
}

fn validate_output_format(format: &str) -> Result<(), ValidationError> {
    if SUPPORTED_OUTPUT_FORMATS.contains(&format.trim_start_matches('.')) {
        return Ok(());
    }
    let mut error = ValidationError::new("output_format");
    error.message = Some(
        format!(
            "output_format must be one of {}",
            SUPPORTED_OUTPUT_FORMATS.join(", ")
        )
        .into(),
    );
    Err(error)
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            transition: None,
            output_format: default_output_format(),
            video_codec: None,
            audio_codec: None,
        }
    }
}

impl MergeOptions {
    /// File extension of the merged output.
    pub fn extension(&self) -> &str {
        self.output_format.trim_start_matches('.')
    }

    /// Transition that actually alters the stream, if any.
    pub fn effective_transition(&self) -> Option<&Transition> {
        self.transition
            .as_ref()
            .filter(|t| t.kind != TransitionKind::None && t.duration_seconds > 0.0)
    }
}

/// Transition applied between merged segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Transition {
    #[serde(default)]
    pub kind: TransitionKind,
    #[serde(default = "default_transition_duration")]
    pub duration_seconds: f64,
}

fn default_transition_duration() -> f64 {
    0.5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    #[default]
    None,
    Fade,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_video_options_defaults() {
        let input: VideoJobInput = serde_json::from_value(json!({"prompt": "a cat"})).unwrap();
        assert_eq!(input.options.aspect_ratio, "16:9");
        assert_eq!(input.options.duration_seconds, 8);
        assert!(input.options.generate_audio);
        assert_eq!(input.options.resolution, "720p");
        assert!(input.image_url.is_none());
    }

    #[test]
    fn test_video_options_partial_override() {
        let input: VideoJobInput = serde_json::from_value(json!({
            "prompt": "a cat",
            "options": {"duration_seconds": 4, "resolution": "1080p"}
        }))
        .unwrap();
        assert_eq!(input.options.duration_seconds, 4);
        assert_eq!(input.options.resolution, "1080p");
        assert_eq!(input.options.aspect_ratio, "16:9");
    }

    #[test]
    fn test_video_input_validation() {
        let input: VideoJobInput = serde_json::from_value(json!({
            "prompt": "",
            "image_url": "not a url",
            "options": {"duration_seconds": 0}
        }))
        .unwrap();
        let errors = input.validate().unwrap_err();
        let fields = errors.errors();
        assert!(fields.contains_key("prompt"));
        assert!(fields.contains_key("image_url"));
        assert!(fields.contains_key("options"));
    }

    #[test]
    fn test_stitch_input_invalid_urls() {
        let input: StitchJobInput = serde_json::from_value(json!({
            "video_urls": ["https://x/a.mp4", "/local/b.mp4", "ftp://x/c.mp4"]
        }))
        .unwrap();
        assert_eq!(input.invalid_urls(), vec!["/local/b.mp4", "ftp://x/c.mp4"]);
        assert_eq!(input.options.output_format, "mp4");
    }

    #[test]
    fn test_stitch_input_requires_urls() {
        let input: StitchJobInput =
            serde_json::from_value(json!({"video_urls": [], "output_name": "demo"})).unwrap();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_stitch_input_rejects_unknown_output_format() {
        for format in ["", "mp4/x", "exe"] {
            let input: StitchJobInput = serde_json::from_value(json!({
                "video_urls": ["https://x/a.mp4"],
                "options": {"output_format": format}
            }))
            .unwrap();
            let errors = input.validate().unwrap_err();
            assert!(errors.errors().contains_key("options"), "{:?}", format);
        }

        let input: StitchJobInput = serde_json::from_value(json!({
            "video_urls": ["https://x/a.mp4"],
            "options": {"output_format": ".webm"}
        }))
        .unwrap();
        assert!(input.validate().is_ok());
        assert_eq!(input.options.extension(), "webm");
    }

    #[test]
    fn test_effective_transition() {
        let mut options = MergeOptions::default();
        assert!(options.effective_transition().is_none());

        options.transition = Some(Transition {
            kind: TransitionKind::None,
            duration_seconds: 1.0,
        });
        assert!(options.effective_transition().is_none());

        options.transition = Some(Transition {
            kind: TransitionKind::Fade,
            duration_seconds: 0.5,
        });
        assert!(options.effective_transition().is_some());
    }
}
