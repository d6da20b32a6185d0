//! Worker configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use bifgen_media::ExtractOptions;
use bifgen_pool::PoolConfig;

use crate::error::{WorkerError, WorkerResult};

/// Everything the worker binary needs to run one generation pass.
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    /// Accelerated worker slots
    pub gpu_workers: usize,
    /// Software-decoding worker slots
    pub cpu_workers: usize,
    /// Seconds between sampled frames
    pub interval_secs: u64,
    /// JPEG quality for -q:v (2 best .. 6 worst for previews)
    pub quality: u8,
    /// Per-item FFmpeg timeout
    pub timeout_secs: u64,
    /// Root for per-task scratch directories
    pub scratch_dir: PathBuf,
    /// Root the artifact bundle layout hangs off
    pub output_dir: PathBuf,
    /// Regenerate artifacts that already exist
    pub regenerate: bool,
    /// Path to the item manifest (JSON array)
    pub manifest: PathBuf,
    /// Accelerator spec, e.g. "cuda,vaapi:/dev/dri/renderD128"
    pub accel_spec: String,
    /// Optional JSON-lines event feed for a remote consumer
    pub feed: Option<PathBuf>,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            gpu_workers: 1,
            cpu_workers: 1,
            interval_secs: 10,
            quality: 4,
            timeout_secs: 1800,
            scratch_dir: std::env::temp_dir().join("bifgen"),
            output_dir: PathBuf::from("previews"),
            regenerate: false,
            manifest: PathBuf::from("manifest.json"),
            accel_spec: String::new(),
            feed: None,
        }
    }
}

impl GenerateConfig {
    /// Load config from `BIFGEN_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            gpu_workers: env_parse("BIFGEN_GPU_WORKERS", defaults.gpu_workers),
            cpu_workers: env_parse("BIFGEN_CPU_WORKERS", defaults.cpu_workers),
            interval_secs: env_parse("BIFGEN_INTERVAL_SECS", defaults.interval_secs),
            quality: env_parse("BIFGEN_QUALITY", defaults.quality),
            timeout_secs: env_parse("BIFGEN_TIMEOUT_SECS", defaults.timeout_secs),
            scratch_dir: env_path("BIFGEN_SCRATCH_DIR", defaults.scratch_dir),
            output_dir: env_path("BIFGEN_OUTPUT_DIR", defaults.output_dir),
            regenerate: std::env::var("BIFGEN_REGENERATE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            manifest: env_path("BIFGEN_MANIFEST", defaults.manifest),
            accel_spec: std::env::var("BIFGEN_ACCEL").unwrap_or_default(),
            feed: std::env::var("BIFGEN_FEED").ok().map(PathBuf::from),
        }
    }

    /// Reject settings FFmpeg or the pool would choke on later.
    pub fn validate(&self) -> WorkerResult<()> {
        if !(2..=6).contains(&self.quality) {
            return Err(WorkerError::InvalidQuality(self.quality));
        }
        if self.interval_secs == 0 {
            return Err(WorkerError::InvalidInterval(self.interval_secs));
        }
        Ok(())
    }

    /// The pool config this worker config implies.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            gpu_workers: self.gpu_workers,
            cpu_workers: self.cpu_workers,
            extract: ExtractOptions {
                interval: Duration::from_secs(self.interval_secs),
                quality: self.quality,
                timeout: Duration::from_secs(self.timeout_secs),
            },
            scratch_root: self.scratch_dir.clone(),
            output_root: self.output_dir.clone(),
            regenerate: self.regenerate,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}
