//! Media items supplied by the catalog collaborator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Stable catalog key identifying one video in the media server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaKey(pub String);

impl MediaKey {
    /// Create from an existing string.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One video to process. Read-only once handed over by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    /// Stable catalog key
    pub key: MediaKey,
    /// Human-readable title for progress display
    pub title: String,
    /// Resolved local file path
    pub path: PathBuf,
    /// Duration hint in milliseconds, if the catalog knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Video codec hint (e.g. "h264", "hevc"), if the catalog knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    /// Whether the source carries an HDR format, per the catalog's probe.
    /// HDR sources need tone mapping or the thumbnails come out washed out.
    #[serde(default)]
    pub hdr: bool,
}

impl MediaItem {
    /// Create an item with just key, title and path.
    pub fn new(key: impl Into<String>, title: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            key: MediaKey::new(key),
            title: title.into(),
            path: path.into(),
            duration_ms: None,
            codec: None,
            hdr: false,
        }
    }

    /// Attach a duration hint.
    pub fn with_duration_ms(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attach a codec hint.
    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }

    /// Mark the source as HDR.
    pub fn with_hdr(mut self, hdr: bool) -> Self {
        self.hdr = hdr;
        self
    }
}
