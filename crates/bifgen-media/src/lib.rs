//! FFmpeg CLI wrapper and BIF index codec.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with hardware-acceleration flags
//! - Progress parsing from `-progress pipe:2`
//! - Cancellation and timeout support via tokio
//! - The frame-extraction pipeline (one media item -> one frame set)
//! - The BIF index encoder/decoder and atomic artifact writes
//! - Deterministic artifact path derivation

pub mod artifact;
pub mod bif;
pub mod command;
pub mod error;
pub mod extract;
pub mod fs_utils;
pub mod progress;

pub use artifact::artifact_path;
pub use bif::{decode, encode, write_artifact, BifIndex, Frame, FrameSet};
pub use command::{allows_keyframe_skip, check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use error::{BifError, BifResult, MediaError, MediaResult};
pub use extract::{extract_frames, ExtractOptions};
pub use progress::{FfmpegProgress, ProgressCallback};
