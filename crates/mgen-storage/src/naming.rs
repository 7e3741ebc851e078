//! Object keys, generated filenames and content types.

use mgen_models::{AssetType, ProjectId};
use rand::distr::Alphanumeric;
use rand::Rng;

use crate::error::{StorageError, StorageResult};

const SUFFIX_LEN: usize = 8;

/// Storage key for an artifact: `{project_id}/{asset_type}/{filename}`.
///
/// Rejects names that could escape the project's directory.
pub fn object_key(
    project_id: &ProjectId,
    asset_type: AssetType,
    filename: &str,
) -> StorageResult<String> {
    validate_segment(project_id.as_str())?;
    validate_segment(filename)?;
    Ok(format!("{}/{}/{}", project_id, asset_type, filename))
}

/// Key prefix holding every artifact of a project.
pub fn project_prefix(project_id: &ProjectId) -> StorageResult<String> {
    validate_segment(project_id.as_str())?;
    Ok(format!("{}/", project_id))
}

fn validate_segment(segment: &str) -> StorageResult<()> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
    {
        return Err(StorageError::invalid_key(format!(
            "invalid path segment: {:?}",
            segment
        )));
    }
    Ok(())
}

/// Unique filename from a millisecond timestamp and a random suffix,
/// e.g. `final_1718000000000_a8Kx02Qz.mp4`.
pub fn generate_filename(prefix: Option<&str>, extension: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect();
    let extension = extension.trim_start_matches('.');

    match prefix.map(sanitize_prefix).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}_{}_{}.{}", prefix, timestamp, suffix, extension),
        None => format!("{}_{}.{}", timestamp, suffix, extension),
    }
}

fn sanitize_prefix(prefix: &str) -> String {
    prefix
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Content type from a filename's extension.
pub fn content_type_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "json" => "application/json",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key() {
        let key = object_key(&ProjectId::new("p1"), AssetType::Videos, "a.mp4").unwrap();
        assert_eq!(key, "p1/videos/a.mp4");
    }

    #[test]
    fn test_object_key_rejects_traversal() {
        let project = ProjectId::new("p1");
        assert!(object_key(&project, AssetType::Videos, "../x.mp4").is_err());
        assert!(object_key(&project, AssetType::Videos, "..").is_err());
        assert!(object_key(&project, AssetType::Videos, "").is_err());
        assert!(object_key(&ProjectId::new("a/b"), AssetType::Videos, "x.mp4").is_err());
    }

    #[test]
    fn test_generate_filename() {
        let name = generate_filename(Some("demo cut"), "mp4");
        assert!(name.starts_with("demo_cut_"));
        assert!(name.ends_with(".mp4"));

        let bare = generate_filename(None, ".png");
        assert!(bare.ends_with(".png"));
        assert!(!bare.contains(".."));
        assert_ne!(generate_filename(None, "mp4"), generate_filename(None, "mp4"));
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type_for("final.MP4"), "video/mp4");
        assert_eq!(content_type_for("frame.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
