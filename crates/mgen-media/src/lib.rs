//! FFmpeg CLI wrapper for merging generated videos.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - Progress parsing from `-progress pipe:2`
//! - Ordered video merging (stream copy or fade transitions)
//! - Per-job transient file tracking

pub mod command;
pub mod error;
pub mod fs_utils;
pub mod merge;
pub mod probe;
pub mod progress;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use fs_utils::TransientFiles;
pub use merge::{concat_list, fade_filter_graph, FfmpegMerger, VideoMerger};
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
