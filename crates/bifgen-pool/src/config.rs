//! Pool configuration, consumed by the core and produced by the caller.

use std::path::PathBuf;

use bifgen_media::ExtractOptions;

/// Configuration for one worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Accelerated worker slots; assigned round-robin over the distinct
    /// accelerated capabilities. With no accelerated capability these
    /// slots decode in software.
    pub gpu_workers: usize,
    /// Software-decoding worker slots
    pub cpu_workers: usize,
    /// Per-run extraction tuning (interval, quality, timeout)
    pub extract: ExtractOptions,
    /// Root for per-task scratch directories
    pub scratch_root: PathBuf,
    /// Root under which artifacts are placed by the stable path contract
    pub output_root: PathBuf,
    /// Regenerate artifacts that already exist
    pub regenerate: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            gpu_workers: 1,
            cpu_workers: 1,
            extract: ExtractOptions::default(),
            scratch_root: std::env::temp_dir().join("bifgen"),
            output_root: PathBuf::from("previews"),
            regenerate: false,
        }
    }
}

impl PoolConfig {
    /// Total worker slots this config asks for.
    pub fn total_workers(&self) -> usize {
        self.gpu_workers + self.cpu_workers
    }
}
