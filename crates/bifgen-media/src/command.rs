//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, warn};

use bifgen_models::Capability;

use crate::error::{MediaError, MediaResult};
use crate::progress::{parse_progress_line, FfmpegProgress};

/// How many trailing stderr lines to keep for failure classification.
const STDERR_TAIL_LINES: usize = 40;

/// How long a cancelled process gets to exit before it is killed.
const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// stderr fragments that mean the accelerator rejected the source rather
/// than the source being broken. Matched case-insensitively on
/// hardware-accelerated runs only.
const HWACCEL_REJECT_PATTERNS: &[&str] = &[
    "failed setup for format",
    "no decoder surfaces",
    "impossible to convert between the formats",
    "no capable devices found",
    "device creation failed",
    "cannot open the device",
    "hardware accelerator failed to decode",
    "no support for codec",
];

/// Builder for FFmpeg frame-extraction commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path or pattern
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether this run uses a hardware decoder
    accelerated: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            accelerated: false,
        }
    }

    /// Add an input argument (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add multiple input arguments.
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Apply the hardware-decoding flags for a capability. Flags must come
    /// before -i. A CPU capability adds nothing.
    pub fn hwaccel(mut self, capability: &Capability) -> Self {
        let Some(name) = capability.kind.hwaccel_name() else {
            return self;
        };
        self.accelerated = true;
        self = self.input_args(["-hwaccel", name]);
        if let Some(device) = &capability.device {
            if name == "vaapi" {
                self = self
                    .input_arg("-vaapi_device")
                    .input_arg(device.to_string_lossy());
            }
        }
        self
    }

    /// Set the video filter chain.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set JPEG quality (-q:v, 2 best to 31 worst).
    pub fn quality(self, quality: u8) -> Self {
        self.output_arg("-q:v").output_arg(quality.to_string())
    }

    /// Drop audio, subtitle and data streams.
    pub fn video_only(self) -> Self {
        self.output_args(["-an", "-sn", "-dn"])
    }

    /// Decode key frames only. Goes before -i, after the hwaccel flags.
    /// Only safe on sources that pass [`allows_keyframe_skip`].
    pub fn skip_frame_nokey(self) -> Self {
        self.input_args(["-skip_frame:v", "nokey"])
    }

    /// Whether this run uses a hardware decoder.
    pub fn is_accelerated(&self) -> bool {
        self.accelerated
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-progress".to_string(),
            "pipe:2".to_string(),
            "-threads:v".to_string(),
            "1".to_string(),
        ];

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with progress tracking, timeout and
/// cancellation.
pub struct FfmpegRunner {
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self {
            cancel_rx: None,
            timeout_secs: None,
        }
    }

    /// Set the cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set the per-run timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command with a progress callback.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, progress_callback: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child.stderr.take().ok_or_else(|| {
            MediaError::Io(std::io::Error::other("stderr not captured"))
        })?;
        let mut reader = BufReader::new(stderr).lines();

        // Progress blocks and error lines share stderr; split them here.
        let stderr_task = tokio::spawn(async move {
            let mut current = FfmpegProgress::default();
            let mut tail: Vec<String> = Vec::new();

            while let Ok(Some(line)) = reader.next_line().await {
                if let Some(progress) = parse_progress_line(&line, &mut current) {
                    progress_callback(progress);
                } else if !line.contains('=') && !line.trim().is_empty() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
            }

            tail
        });

        let wait_result = self.wait_for_completion(&mut child).await;

        let tail = stderr_task.await.unwrap_or_default();
        let stderr_text = tail.join("\n");

        match wait_result {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => {
                if cmd.is_accelerated() && looks_like_hwaccel_reject(&stderr_text) {
                    Err(MediaError::AcceleratorUnsupported {
                        detail: last_line(&stderr_text),
                    })
                } else {
                    Err(MediaError::NonZeroExit {
                        code: status.code(),
                        stderr: stderr_text,
                    })
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Wait for the child with timeout and cooperative-then-forceful
    /// cancellation.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<std::process::ExitStatus> {
        let timeout = self.timeout_secs.map(Duration::from_secs);
        let mut cancel_rx = self.cancel_rx.clone();

        let wait = async {
            loop {
                tokio::select! {
                    status = child.wait() => return status.map_err(MediaError::Io),
                    changed = wait_for_cancel(&mut cancel_rx) => {
                        if changed {
                            warn!("FFmpeg run cancelled, terminating after grace period");
                            // Give the process a moment to flush, then kill.
                            let graceful = tokio::time::timeout(CANCEL_GRACE, child.wait()).await;
                            if let Ok(Ok(status)) = graceful {
                                let _ = status;
                            } else {
                                let _ = child.kill().await;
                            }
                            return Err(MediaError::Cancelled);
                        }
                    }
                }
            }
        };

        match timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("FFmpeg timed out after {}s, killing process", limit.as_secs());
                    let _ = child.kill().await;
                    Err(MediaError::Timeout(limit.as_secs()))
                }
            },
            None => wait.await,
        }
    }
}

/// Resolve when the cancel flag flips to true; pend forever without a
/// receiver so the select arm never fires.
async fn wait_for_cancel(cancel_rx: &mut Option<watch::Receiver<bool>>) -> bool {
    match cancel_rx {
        Some(rx) => {
            if *rx.borrow() {
                return true;
            }
            while rx.changed().await.is_ok() {
                if *rx.borrow() {
                    return true;
                }
            }
            // Sender dropped without cancelling. No signal can arrive
            // anymore, so pend instead of resolving in a loop.
            std::future::pending().await
        }
        None => std::future::pending().await,
    }
}

fn looks_like_hwaccel_reject(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    HWACCEL_REJECT_PATTERNS.iter().any(|p| lower.contains(p))
}

fn last_line(stderr: &str) -> String {
    stderr.lines().last().unwrap_or("").to_string()
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Decide whether `-skip_frame:v nokey` is safe for this source by
/// decoding its first frames key-only under strict error detection.
/// Some encodes break when non-key frames are dropped; anything short of
/// a clean exit means the main run decodes every frame.
pub async fn allows_keyframe_skip(input: &Path) -> bool {
    let args = keyframe_skip_check_args(input);
    let status = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await;

    match status {
        Ok(status) if status.success() => true,
        Ok(_) => {
            debug!(
                input = %input.display(),
                "Keyframe-only decode check failed, decoding all frames"
            );
            false
        }
        Err(e) => {
            debug!(error = %e, "Could not run keyframe-only decode check");
            false
        }
    }
}

fn keyframe_skip_check_args(input: &Path) -> Vec<String> {
    let null_sink = if cfg!(windows) { "NUL" } else { "/dev/null" };
    let mut args: Vec<String> = [
        "-hide_banner",
        "-nostats",
        "-v",
        "error",
        "-xerror",
        "-err_detect",
        "explode",
        "-skip_frame:v",
        "nokey",
        "-threads:v",
        "1",
        "-i",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(input.to_string_lossy().to_string());
    args.extend(
        ["-an", "-sn", "-dn", "-frames:v", "10", "-f", "null", null_sink]
            .iter()
            .map(|s| s.to_string()),
    );
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use bifgen_models::AccelKind;

    #[test]
    fn test_command_builder_ordering() {
        let cap = Capability::accelerated(AccelKind::Vaapi, Some("/dev/dri/renderD128".into()));
        let cmd = FfmpegCommand::new("input.mkv", "out/img-%06d.jpg")
            .hwaccel(&cap)
            .video_only()
            .quality(4)
            .video_filter("fps=fps=0.1:round=up");

        let args = cmd.build_args();

        // Hardware flags must precede -i.
        let hwaccel_pos = args.iter().position(|a| a == "-hwaccel").unwrap();
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        assert!(hwaccel_pos < input_pos);
        assert!(args.contains(&"vaapi".to_string()));
        assert!(args.contains(&"-vaapi_device".to_string()));
        assert!(args.contains(&"/dev/dri/renderD128".to_string()));

        // Output options follow -i.
        let q_pos = args.iter().position(|a| a == "-q:v").unwrap();
        assert!(q_pos > input_pos);
        assert_eq!(args.last().unwrap(), "out/img-%06d.jpg");
        assert!(cmd.is_accelerated());
    }

    #[test]
    fn test_cpu_capability_adds_no_hwaccel() {
        let cmd = FfmpegCommand::new("in.mkv", "out.jpg").hwaccel(&Capability::cpu());
        assert!(!cmd.is_accelerated());
        assert!(!cmd.build_args().contains(&"-hwaccel".to_string()));
    }

    #[test]
    fn test_cuda_has_no_device_flag() {
        let cap = Capability::accelerated(AccelKind::Cuda, None);
        let args = FfmpegCommand::new("in.mkv", "out.jpg").hwaccel(&cap).build_args();
        assert!(args.contains(&"cuda".to_string()));
        assert!(!args.contains(&"-vaapi_device".to_string()));
    }

    #[test]
    fn test_skip_frame_flag_precedes_input() {
        let cap = Capability::accelerated(AccelKind::Cuda, None);
        let args = FfmpegCommand::new("in.mkv", "out/img-%06d.jpg")
            .hwaccel(&cap)
            .skip_frame_nokey()
            .build_args();

        let skip_pos = args.iter().position(|a| a == "-skip_frame:v").unwrap();
        let hwaccel_pos = args.iter().position(|a| a == "-hwaccel").unwrap();
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        assert!(hwaccel_pos < skip_pos);
        assert!(skip_pos < input_pos);
        assert_eq!(args[skip_pos + 1], "nokey");
    }

    #[test]
    fn test_keyframe_skip_check_args() {
        let args = keyframe_skip_check_args(Path::new("/media/movie.mkv"));

        let skip_pos = args.iter().position(|a| a == "-skip_frame:v").unwrap();
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        assert!(skip_pos < input_pos);
        assert_eq!(args[input_pos + 1], "/media/movie.mkv");

        // Strict error detection so a decoder hiccup fails the check.
        assert!(args.contains(&"-xerror".to_string()));
        let detect_pos = args.iter().position(|a| a == "-err_detect").unwrap();
        assert_eq!(args[detect_pos + 1], "explode");

        // Only a handful of frames, discarded.
        let frames_pos = args.iter().position(|a| a == "-frames:v").unwrap();
        assert_eq!(args[frames_pos + 1], "10");
        let format_pos = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[format_pos + 1], "null");
    }

    #[tokio::test]
    async fn test_cancel_wait_pends_after_sender_drop() {
        let (tx, rx) = watch::channel(false);
        let mut cancel_rx = Some(rx);
        drop(tx);

        // A closed channel must never resolve, or the runner's select
        // loop would spin re-polling it while FFmpeg runs.
        let wait = wait_for_cancel(&mut cancel_rx);
        let timed = tokio::time::timeout(Duration::from_millis(50), wait).await;
        assert!(timed.is_err());
    }

    #[tokio::test]
    async fn test_cancel_wait_resolves_on_flag() {
        let (tx, rx) = watch::channel(false);
        let mut cancel_rx = Some(rx);
        tx.send(true).unwrap();

        assert!(wait_for_cancel(&mut cancel_rx).await);
    }

    #[test]
    fn test_hwaccel_reject_classification() {
        assert!(looks_like_hwaccel_reject(
            "[h264 @ 0x55] Failed setup for format cuda: hwaccel initialisation returned error."
        ));
        assert!(looks_like_hwaccel_reject("No capable devices found"));
        assert!(!looks_like_hwaccel_reject(
            "input.mkv: Invalid data found when processing input"
        ));
    }
}
