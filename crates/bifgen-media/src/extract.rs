//! The frame-extraction pipeline: one (media item, capability) pair in,
//! one ordered frame set out, or a typed failure.

use std::path::Path;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use bifgen_models::{Capability, MediaItem};

use crate::bif::{Frame, FrameSet};
use crate::command::{allows_keyframe_skip, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Scrubbing thumbnails are capped at 320x240 keeping aspect ratio.
const SCALE_FILTER: &str = "scale=w=320:h=240:force_original_aspect_ratio=decrease";

/// Hable tone mapping down to BT.709 SDR. Without this, thumbnails from
/// HDR sources come out grey and washed out.
const TONEMAP_FILTER: &str = "zscale=t=linear:npl=100,format=gbrpf32le,zscale=p=bt709,\
     tonemap=tonemap=hable:desat=0,zscale=t=bt709:m=bt709:r=tv,format=yuv420p";

/// Output file pattern inside the scratch directory.
const FRAME_PATTERN: &str = "img-%06d.jpg";

/// Tuning for one pipeline run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Seconds between sampled frames
    pub interval: Duration,
    /// JPEG quality for -q:v (2 best .. 31 worst)
    pub quality: u8,
    /// Bounded timeout for the whole run
    pub timeout: Duration,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            quality: 4,
            timeout: Duration::from_secs(1800),
        }
    }
}

impl ExtractOptions {
    /// Sampling interval in milliseconds.
    pub fn interval_ms(&self) -> u32 {
        self.interval.as_millis() as u32
    }

    /// The filter chain for this interval: fps sampling, tone mapping for
    /// HDR sources, then the thumbnail scale.
    pub fn video_filter(&self, hdr: bool) -> String {
        let fps = 1.0 / self.interval.as_secs_f64();
        if hdr {
            format!("fps=fps={:.6}:round=up,{},{}", fps, TONEMAP_FILTER, SCALE_FILTER)
        } else {
            format!("fps=fps={:.6}:round=up,{}", fps, SCALE_FILTER)
        }
    }
}

/// Extract still frames from `item` into `scratch_dir` using the decoder
/// selected by `capability`.
///
/// On success the frames come back ordered by timestamp. Zero frames is
/// an [`MediaError::EmptyOutput`] failure, not a silent success.
pub async fn extract_frames<F>(
    item: &MediaItem,
    capability: &Capability,
    scratch_dir: &Path,
    options: &ExtractOptions,
    progress_callback: F,
    cancel: Option<watch::Receiver<bool>>,
) -> MediaResult<FrameSet>
where
    F: Fn(FfmpegProgress) + Send + 'static,
{
    if !item.path.is_file() {
        return Err(MediaError::SourceNotFound(item.path.clone()));
    }

    tokio::fs::create_dir_all(scratch_dir).await?;

    let mut cmd = FfmpegCommand::new(&item.path, scratch_dir.join(FRAME_PATTERN))
        .hwaccel(capability)
        .video_only()
        .quality(options.quality)
        .video_filter(options.video_filter(item.hdr));

    // Decoding key frames only is much faster but breaks some encodes,
    // so each source is vetted first.
    if allows_keyframe_skip(&item.path).await {
        cmd = cmd.skip_frame_nokey();
    }

    let mut runner = FfmpegRunner::new().with_timeout(options.timeout.as_secs());
    if let Some(cancel_rx) = cancel {
        runner = runner.with_cancel(cancel_rx);
    }

    debug!(
        item = %item.key,
        capability = %capability,
        "Extracting frames every {}s",
        options.interval.as_secs_f64()
    );
    runner.run_with_progress(&cmd, progress_callback).await?;

    let frames = collect_frames(scratch_dir, options.interval_ms()).await?;
    if frames.is_empty() {
        return Err(MediaError::EmptyOutput);
    }

    info!(
        item = %item.key,
        capability = %capability,
        frames = frames.len(),
        "Frame extraction complete"
    );

    Ok(FrameSet {
        interval_ms: options.interval_ms(),
        frames,
    })
}

/// Collect `img-%06d.jpg` files in sequence order and tag each with its
/// timestamp: frame n is sampled at the start of interval n-1.
async fn collect_frames(scratch_dir: &Path, interval_ms: u32) -> MediaResult<Vec<Frame>> {
    let mut numbered: Vec<(u32, std::path::PathBuf)> = Vec::new();

    let mut entries = tokio::fs::read_dir(scratch_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if let Some(seq) = frame_sequence_number(&path) {
            numbered.push((seq, path));
        }
    }
    numbered.sort_by_key(|(seq, _)| *seq);

    let mut frames = Vec::with_capacity(numbered.len());
    for (seq, path) in numbered {
        let data = tokio::fs::read(&path).await?;
        frames.push(Frame {
            timestamp_ms: (seq - 1) * interval_ms,
            data,
        });
    }

    Ok(frames)
}

/// Parse the 1-based sequence number out of an `img-NNNNNN.jpg` name.
fn frame_sequence_number(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let digits = name.strip_prefix("img-")?.strip_suffix(".jpg")?;
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_video_filter_for_interval() {
        let options = ExtractOptions {
            interval: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(
            options.video_filter(false),
            format!("fps=fps=0.100000:round=up,{SCALE_FILTER}")
        );
    }

    #[test]
    fn test_hdr_filter_tone_maps_before_scaling() {
        let options = ExtractOptions::default();
        let filter = options.video_filter(true);

        assert!(filter.starts_with("fps=fps=0.100000:round=up,"));
        assert!(filter.contains("tonemap=tonemap=hable:desat=0"));
        assert!(filter.contains("zscale=t=linear:npl=100"));
        let tonemap_pos = filter.find("tonemap=").unwrap();
        let scale_pos = filter.find(SCALE_FILTER).unwrap();
        assert!(tonemap_pos < scale_pos);

        // SDR sources keep the plain chain.
        assert!(!options.video_filter(false).contains("tonemap"));
    }

    #[test]
    fn test_frame_sequence_number() {
        assert_eq!(
            frame_sequence_number(Path::new("/tmp/img-000001.jpg")),
            Some(1)
        );
        assert_eq!(
            frame_sequence_number(Path::new("/tmp/img-000042.jpg")),
            Some(42)
        );
        assert_eq!(frame_sequence_number(Path::new("/tmp/other.jpg")), None);
        assert_eq!(frame_sequence_number(Path::new("/tmp/img-1.txt")), None);
    }

    #[tokio::test]
    async fn test_collect_frames_ordered_and_timestamped() {
        let dir = TempDir::new().unwrap();
        // Written out of order on purpose.
        for (name, body) in [
            ("img-000003.jpg", b"three".as_slice()),
            ("img-000001.jpg", b"one".as_slice()),
            ("img-000002.jpg", b"two".as_slice()),
            ("not-a-frame.log", b"junk".as_slice()),
        ] {
            tokio::fs::write(dir.path().join(name), body).await.unwrap();
        }

        let frames = collect_frames(dir.path(), 10_000).await.unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].timestamp_ms, 0);
        assert_eq!(frames[1].timestamp_ms, 10_000);
        assert_eq!(frames[2].timestamp_ms, 20_000);
        assert_eq!(frames[0].data, b"one");
        assert_eq!(frames[2].data, b"three");
    }

    #[tokio::test]
    async fn test_missing_source_is_typed() {
        let item = MediaItem::new("k", "t", "/definitely/not/here.mkv");
        let dir = TempDir::new().unwrap();
        let result = extract_frames(
            &item,
            &Capability::cpu(),
            dir.path(),
            &ExtractOptions::default(),
            |_| {},
            None,
        )
        .await;

        assert!(matches!(result, Err(MediaError::SourceNotFound(_))));
    }
}
