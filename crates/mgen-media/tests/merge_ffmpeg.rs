//! Merges real clips with the FFmpeg CLI.

use std::path::{Path, PathBuf};

use mgen_media::{probe_video, FfmpegMerger, VideoMerger};
use mgen_models::{MergeOptions, Transition, TransitionKind};
use tempfile::TempDir;
use tokio::process::Command;

async fn make_clip(dir: &Path, name: &str, color: &str) -> PathBuf {
    let path = dir.join(name);
    let status = Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-f", "lavfi", "-i"])
        .arg(format!("color=c={}:s=64x64:d=1:r=25", color))
        .args(["-f", "lavfi", "-i", "sine=frequency=440:duration=1"])
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac", "-shortest"])
        .arg(&path)
        .status()
        .await
        .unwrap();
    assert!(status.success());
    path
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn merges_clips_in_order_with_stream_copy() {
    let dir = TempDir::new().unwrap();
    let inputs = vec![
        make_clip(dir.path(), "a.mp4", "red").await,
        make_clip(dir.path(), "b.mp4", "green").await,
        make_clip(dir.path(), "c.mp4", "blue").await,
    ];
    let output = dir.path().join("merged.mp4");

    FfmpegMerger::new()
        .merge(&inputs, &output, &MergeOptions::default())
        .await
        .unwrap();

    let info = probe_video(&output).await.unwrap();
    assert!((info.duration - 3.0).abs() < 0.5, "duration {}", info.duration);
    assert!(!dir.path().join("merged.concat.txt").exists());
}

#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn merges_clips_with_fade() {
    let dir = TempDir::new().unwrap();
    let inputs = vec![
        make_clip(dir.path(), "a.mp4", "red").await,
        make_clip(dir.path(), "b.mp4", "green").await,
    ];
    let output = dir.path().join("merged.mp4");
    let options = MergeOptions {
        transition: Some(Transition {
            kind: TransitionKind::Fade,
            duration_seconds: 0.25,
        }),
        ..Default::default()
    };

    FfmpegMerger::new().merge(&inputs, &output, &options).await.unwrap();

    let info = probe_video(&output).await.unwrap();
    assert!(info.has_audio);
    assert!((info.duration - 2.0).abs() < 0.5, "duration {}", info.duration);
}
