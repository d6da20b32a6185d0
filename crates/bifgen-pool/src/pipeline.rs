//! The extraction-pipeline contract each worker drives.
//!
//! The scheduler only sees this trait, so it can be exercised in tests
//! without FFmpeg on the machine.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::watch;

use bifgen_media::{extract_frames, ExtractOptions, FfmpegProgress, FrameSet, MediaResult};
use bifgen_models::{Capability, MediaItem};

/// Progress callback handed into a pipeline run.
pub type PipelineProgress = Box<dyn Fn(FfmpegProgress) + Send + 'static>;

/// Turn one (media item, capability) pair into a frame set or a typed
/// failure.
#[async_trait]
pub trait ExtractionPipeline: Send + Sync {
    async fn extract(
        &self,
        item: &MediaItem,
        capability: &Capability,
        scratch_dir: &Path,
        options: &ExtractOptions,
        progress: PipelineProgress,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<FrameSet>;
}

/// Production pipeline: invokes FFmpeg through bifgen-media.
#[derive(Debug, Default)]
pub struct FfmpegPipeline;

#[async_trait]
impl ExtractionPipeline for FfmpegPipeline {
    async fn extract(
        &self,
        item: &MediaItem,
        capability: &Capability,
        scratch_dir: &Path,
        options: &ExtractOptions,
        progress: PipelineProgress,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<FrameSet> {
        extract_frames(item, capability, scratch_dir, options, progress, Some(cancel)).await
    }
}
