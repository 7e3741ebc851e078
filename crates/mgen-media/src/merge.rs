//! Ordered merging of video files.
//!
//! Segments always appear in the output in the order given. Without a
//! transition the concat demuxer copies streams as-is; a fade transition
//! re-encodes through the concat filter with a fade-in on every segment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use mgen_models::{MergeOptions, Transition};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

const DEFAULT_VIDEO_CODEC: &str = "libx264";
const DEFAULT_AUDIO_CODEC: &str = "aac";

/// Merges local video files into one.
#[async_trait]
pub trait VideoMerger: Send + Sync {
    /// Intermediate files `merge` may create for `output`.
    fn scratch_paths(&self, _output: &Path) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Merge `inputs` in order into `output`.
    async fn merge(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        options: &MergeOptions,
    ) -> MediaResult<()>;
}

/// [`VideoMerger`] backed by the FFmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegMerger {
    runner: FfmpegRunner,
}

impl FfmpegMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.runner = self.runner.with_timeout(timeout);
        self
    }

    fn list_path(output: &Path) -> PathBuf {
        output.with_extension("concat.txt")
    }

    async fn concat_copy(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        options: &MergeOptions,
    ) -> MediaResult<()> {
        let list_path = Self::list_path(output);
        tokio::fs::write(&list_path, concat_list(inputs)).await?;

        let cmd = FfmpegCommand::new(output)
            .input_with_args(["-f", "concat", "-safe", "0"], &list_path)
            .video_codec(options.video_codec.as_deref().unwrap_or("copy"))
            .audio_codec(options.audio_codec.as_deref().unwrap_or("copy"))
            .output_args(container_args(output));

        let result = self.runner.run(&cmd).await;

        // The list is removed here as well as by the caller's cleanup
        let _ = tokio::fs::remove_file(&list_path).await;
        result
    }

    async fn concat_with_fade(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        options: &MergeOptions,
        transition: &Transition,
    ) -> MediaResult<()> {
        let mut with_audio = true;
        let mut total_ms = 0i64;
        for input in inputs {
            let info = probe_video(input).await?;
            with_audio &= info.has_audio;
            total_ms += (info.duration * 1000.0) as i64;
        }

        let graph = fade_filter_graph(inputs.len(), transition.duration_seconds, with_audio);
        let mut cmd = inputs
            .iter()
            .fold(FfmpegCommand::new(output), |cmd, input| cmd.input(input))
            .filter_complex(graph)
            .map("[outv]");
        if with_audio {
            cmd = cmd
                .map("[outa]")
                .audio_codec(options.audio_codec.as_deref().unwrap_or(DEFAULT_AUDIO_CODEC));
        }
        let cmd = cmd
            .video_codec(options.video_codec.as_deref().unwrap_or(DEFAULT_VIDEO_CODEC))
            .output_args(["-pix_fmt", "yuv420p"])
            .output_args(container_args(output));

        self.runner
            .run_with_progress(&cmd, move |progress| {
                debug!(percent = progress.percentage(total_ms), "Merge progress");
            })
            .await
    }
}

#[async_trait]
impl VideoMerger for FfmpegMerger {
    fn scratch_paths(&self, output: &Path) -> Vec<PathBuf> {
        vec![Self::list_path(output)]
    }

    async fn merge(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        options: &MergeOptions,
    ) -> MediaResult<()> {
        if inputs.is_empty() {
            return Err(MediaError::NoInputs);
        }
        for input in inputs {
            if !tokio::fs::try_exists(input).await? {
                return Err(MediaError::FileNotFound(input.clone()));
            }
        }

        match options.effective_transition() {
            Some(transition) => {
                info!(
                    segments = inputs.len(),
                    fade = transition.duration_seconds,
                    "Merging videos with fade transition"
                );
                self.concat_with_fade(inputs, output, options, transition)
                    .await?
            }
            None => {
                info!(segments = inputs.len(), "Merging videos with stream copy");
                self.concat_copy(inputs, output, options).await?
            }
        }

        if !tokio::fs::try_exists(output).await? {
            return Err(MediaError::ffmpeg_failed(
                "Merge produced no output file",
                None,
                None,
            ));
        }
        Ok(())
    }
}

/// Concat demuxer list, one `file '...'` line per input in order.
pub fn concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|path| {
            // Single quotes close, escape and reopen the quoted string
            let escaped = path.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

/// Filter graph fading each segment in and concatenating them in order.
/// Produces `[outv]` and, with audio, `[outa]`.
pub fn fade_filter_graph(segments: usize, fade_seconds: f64, with_audio: bool) -> String {
    let mut chains = Vec::with_capacity(segments * 2 + 1);
    let mut concat_inputs = String::new();

    for i in 0..segments {
        chains.push(format!(
            "[{i}:v]setpts=PTS-STARTPTS,fade=t=in:st=0:d={fade:.3}[v{i}]",
            i = i,
            fade = fade_seconds
        ));
        concat_inputs.push_str(&format!("[v{}]", i));
        if with_audio {
            chains.push(format!(
                "[{i}:a]asetpts=PTS-STARTPTS,afade=t=in:st=0:d={fade:.3}[a{i}]",
                i = i,
                fade = fade_seconds
            ));
            concat_inputs.push_str(&format!("[a{}]", i));
        }
    }

    if with_audio {
        chains.push(format!(
            "{}concat=n={}:v=1:a=1[outv][outa]",
            concat_inputs, segments
        ));
    } else {
        chains.push(format!("{}concat=n={}:v=1:a=0[outv]", concat_inputs, segments));
    }

    chains.join(";")
}

fn container_args(output: &Path) -> Vec<&'static str> {
    match output.extension().and_then(|e| e.to_str()) {
        Some("mp4") | Some("mov") => vec!["-movflags", "+faststart"],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgen_models::TransitionKind;

    #[test]
    fn test_concat_list_preserves_order() {
        let inputs = vec![
            PathBuf::from("/tmp/s/input_0.mp4"),
            PathBuf::from("/tmp/s/input_1.mp4"),
            PathBuf::from("/tmp/s/input_2.mp4"),
        ];
        assert_eq!(
            concat_list(&inputs),
            "file '/tmp/s/input_0.mp4'\nfile '/tmp/s/input_1.mp4'\nfile '/tmp/s/input_2.mp4'\n"
        );
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let inputs = vec![PathBuf::from("/tmp/it's.mp4")];
        assert_eq!(concat_list(&inputs), "file '/tmp/it'\\''s.mp4'\n");
    }

    #[test]
    fn test_fade_filter_graph_with_audio() {
        let graph = fade_filter_graph(2, 0.5, true);
        assert_eq!(
            graph,
            "[0:v]setpts=PTS-STARTPTS,fade=t=in:st=0:d=0.500[v0];\
             [0:a]asetpts=PTS-STARTPTS,afade=t=in:st=0:d=0.500[a0];\
             [1:v]setpts=PTS-STARTPTS,fade=t=in:st=0:d=0.500[v1];\
             [1:a]asetpts=PTS-STARTPTS,afade=t=in:st=0:d=0.500[a1];\
             [v0][a0][v1][a1]concat=n=2:v=1:a=1[outv][outa]"
        );
    }

    #[test]
    fn test_fade_filter_graph_video_only() {
        let graph = fade_filter_graph(3, 1.0, false);
        assert!(graph.ends_with("[v0][v1][v2]concat=n=3:v=1:a=0[outv]"));
        assert!(!graph.contains(":a]"));
    }

    #[test]
    fn test_scratch_paths() {
        let merger = FfmpegMerger::new();
        assert_eq!(
            merger.scratch_paths(Path::new("/tmp/s/merged.mp4")),
            vec![PathBuf::from("/tmp/s/merged.concat.txt")]
        );
    }

    #[tokio::test]
    async fn test_merge_rejects_empty_and_missing_inputs() {
        let merger = FfmpegMerger::new();
        let options = MergeOptions::default();
        let output = Path::new("/tmp/never-written.mp4");

        assert!(matches!(
            merger.merge(&[], output, &options).await,
            Err(MediaError::NoInputs)
        ));

        let fade = MergeOptions {
            transition: Some(Transition {
                kind: TransitionKind::Fade,
                duration_seconds: 0.5,
            }),
            ..Default::default()
        };
        let missing = vec![PathBuf::from("/definitely/not/here.mp4")];
        assert!(matches!(
            merger.merge(&missing, output, &fade).await,
            Err(MediaError::FileNotFound(_))
        ));
    }
}
