//! Deterministic artifact path derivation.
//!
//! The media server locates previews by this convention, so the layout
//! must stay stable: the catalog key is hashed, the first hex digit picks
//! a shard directory, and the rest names the bundle.

use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use bifgen_models::MediaKey;

/// File name of the preview index inside a bundle.
pub const INDEX_FILE: &str = "index-sd.bif";

/// Derive the artifact path for a catalog key under `output_root`:
/// `<root>/<h0>/<h1..>.bundle/Contents/Indexes/index-sd.bif` where `h`
/// is the lowercase SHA-256 hex of the key.
pub fn artifact_path(output_root: impl AsRef<Path>, key: &MediaKey) -> PathBuf {
    let digest = Sha256::digest(key.as_str().as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }

    output_root
        .as_ref()
        .join(&hex[..1])
        .join(format!("{}.bundle", &hex[1..]))
        .join("Contents")
        .join("Indexes")
        .join(INDEX_FILE)
}
