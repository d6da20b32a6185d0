//! Hardware capability descriptors from the capability-probe collaborator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Acceleration family for one worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccelKind {
    /// NVIDIA CUDA decoding
    Cuda,
    /// VAAPI decoding (Intel, AMD, ARM) via a /dev/dri render node
    Vaapi,
    /// Apple VideoToolbox decoding
    VideoToolbox,
    /// Windows / WSL2 D3D11VA decoding
    D3d11va,
    /// Software decoding
    Cpu,
}

impl AccelKind {
    /// True for every kind except software decoding.
    pub fn is_accelerated(&self) -> bool {
        !matches!(self, AccelKind::Cpu)
    }

    /// The FFmpeg `-hwaccel` argument for this kind, if any.
    pub fn hwaccel_name(&self) -> Option<&'static str> {
        match self {
            AccelKind::Cuda => Some("cuda"),
            AccelKind::Vaapi => Some("vaapi"),
            AccelKind::VideoToolbox => Some("videotoolbox"),
            AccelKind::D3d11va => Some("d3d11va"),
            AccelKind::Cpu => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccelKind::Cuda => "cuda",
            AccelKind::Vaapi => "vaapi",
            AccelKind::VideoToolbox => "videotoolbox",
            AccelKind::D3d11va => "d3d11va",
            AccelKind::Cpu => "cpu",
        }
    }
}

impl fmt::Display for AccelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One hardware worker slot: an acceleration family, an optional device
/// node, and the codecs the probe verified it can decode.
///
/// Supplied once at pool construction and immutable for the pool's
/// lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    /// Acceleration family
    pub kind: AccelKind,
    /// Device handle (e.g. `/dev/dri/renderD128` for VAAPI)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<PathBuf>,
    /// Codecs this slot can decode. Empty means the probe gave no detail
    /// and the slot accepts anything.
    #[serde(default)]
    pub codecs: Vec<String>,
}

impl Capability {
    /// Create a software-decoding capability.
    pub fn cpu() -> Self {
        Self {
            kind: AccelKind::Cpu,
            device: None,
            codecs: Vec::new(),
        }
    }

    /// Create an accelerated capability.
    pub fn accelerated(kind: AccelKind, device: Option<PathBuf>) -> Self {
        Self {
            kind,
            device,
            codecs: Vec::new(),
        }
    }

    /// Restrict this capability to a set of decodable codecs.
    pub fn with_codecs<I, S>(mut self, codecs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codecs = codecs.into_iter().map(Into::into).collect();
        self
    }

    /// True if this slot uses hardware decoding.
    pub fn is_accelerated(&self) -> bool {
        self.kind.is_accelerated()
    }

    /// Whether this slot can decode the given codec. CPU decodes
    /// everything; an accelerated slot with no codec list accepts
    /// everything.
    pub fn supports_codec(&self, codec: &str) -> bool {
        if !self.is_accelerated() || self.codecs.is_empty() {
            return true;
        }
        self.codecs.iter().any(|c| c.eq_ignore_ascii_case(codec))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.device {
            Some(dev) => write!(f, "{}:{}", self.kind, dev.display()),
            None => write!(f, "{}", self.kind),
        }
    }
}
