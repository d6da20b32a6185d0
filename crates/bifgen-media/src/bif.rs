//! BIF index encoder/decoder.
//!
//! A BIF artifact is a 64-byte header, an index table of
//! `(timestamp_ms, offset)` pairs closed by a sentinel entry, then the
//! raw frame images concatenated with no separators. All integers are
//! little-endian. Offsets are relative to the start of the image region.

use std::path::Path;

use crate::error::{BifError, BifResult, MediaResult};
use crate::fs_utils;

/// BIF magic bytes.
pub const MAGIC: [u8; 8] = [0x89, 0x42, 0x49, 0x46, 0x0d, 0x0a, 0x1a, 0x0a];

/// Only version 0 exists.
pub const VERSION: u32 = 0;

/// Fixed header size in bytes.
pub const HEADER_LEN: usize = 64;

/// Sentinel timestamp closing the index table.
const TABLE_END: u32 = 0xFFFF_FFFF;

/// One still frame tagged with its offset into the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Milliseconds from the start of the source
    pub timestamp_ms: u32,
    /// Raw image bytes (the codec never looks inside)
    pub data: Vec<u8>,
}

/// Ordered frame sequence from one successful pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSet {
    /// Sampling interval in milliseconds
    pub interval_ms: u32,
    /// Frames ordered by timestamp
    pub frames: Vec<Frame>,
}

impl FrameSet {
    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the set holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Decoded view of an artifact, used by readers and round-trip tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BifIndex {
    /// Format version from the header
    pub version: u32,
    /// Sampling interval in milliseconds
    pub interval_ms: u32,
    /// Recovered frames
    pub frames: Vec<Frame>,
}

impl From<BifIndex> for FrameSet {
    fn from(index: BifIndex) -> Self {
        FrameSet {
            interval_ms: index.interval_ms,
            frames: index.frames,
        }
    }
}

/// Encode a frame set into BIF bytes.
///
/// Pure and total for any non-empty set with non-decreasing timestamps;
/// only byte lengths and timestamps are inspected.
pub fn encode(set: &FrameSet) -> BifResult<Vec<u8>> {
    if set.is_empty() {
        return Err(BifError::EmptyFrameSet);
    }
    for (index, pair) in set.frames.windows(2).enumerate() {
        if pair[1].timestamp_ms < pair[0].timestamp_ms {
            return Err(BifError::NonMonotonicTimestamps { index: index + 1 });
        }
    }

    let count = set.frames.len();
    let table_len = 8 * (count + 1);
    let image_len: usize = set.frames.iter().map(|f| f.data.len()).sum();

    let mut out = Vec::with_capacity(HEADER_LEN + table_len + image_len);

    // Header
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(count as u32).to_le_bytes());
    out.extend_from_slice(&set.interval_ms.to_le_bytes());
    out.resize(HEADER_LEN, 0);

    // Index table: offsets are relative to the image region.
    let mut offset: u32 = 0;
    for frame in &set.frames {
        out.extend_from_slice(&frame.timestamp_ms.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
        offset += frame.data.len() as u32;
    }
    out.extend_from_slice(&TABLE_END.to_le_bytes());
    out.extend_from_slice(&offset.to_le_bytes());

    // Image region
    for frame in &set.frames {
        out.extend_from_slice(&frame.data);
    }

    Ok(out)
}

/// Decode BIF bytes back into an index.
///
/// Rejects bad magic, unknown versions, a zero frame count and truncated
/// data rather than returning a partial structure.
pub fn decode(bytes: &[u8]) -> BifResult<BifIndex> {
    if bytes.len() < HEADER_LEN {
        return Err(BifError::Truncated);
    }
    if bytes[..8] != MAGIC {
        return Err(BifError::BadMagic);
    }

    let version = read_u32(bytes, 8)?;
    if version != VERSION {
        return Err(BifError::UnsupportedVersion(version));
    }

    let count = read_u32(bytes, 12)? as usize;
    if count == 0 {
        return Err(BifError::ZeroFrameCount);
    }
    let interval_ms = read_u32(bytes, 16)?;

    let table_start = HEADER_LEN;
    let image_start = table_start + 8 * (count + 1);
    if bytes.len() < image_start {
        return Err(BifError::Truncated);
    }
    let image_region = &bytes[image_start..];

    // Read the table including the sentinel; the sentinel's offset is the
    // image region length, which bounds the final frame.
    let mut entries = Vec::with_capacity(count + 1);
    for i in 0..=count {
        let base = table_start + 8 * i;
        entries.push((read_u32(bytes, base)?, read_u32(bytes, base + 4)?));
    }
    let (sentinel_ts, total_image_bytes) = entries[count];
    if sentinel_ts != TABLE_END {
        return Err(BifError::Truncated);
    }
    if image_region.len() < total_image_bytes as usize {
        return Err(BifError::Truncated);
    }

    let mut frames = Vec::with_capacity(count);
    for i in 0..count {
        let (timestamp_ms, start) = entries[i];
        let end = entries[i + 1].1;
        if end < start || end as usize > image_region.len() {
            return Err(BifError::Truncated);
        }
        frames.push(Frame {
            timestamp_ms,
            data: image_region[start as usize..end as usize].to_vec(),
        });
    }

    Ok(BifIndex {
        version,
        interval_ms,
        frames,
    })
}

fn read_u32(bytes: &[u8], offset: usize) -> BifResult<u32> {
    let slice = bytes
        .get(offset..offset + 4)
        .ok_or(BifError::Truncated)?;
    Ok(u32::from_le_bytes(slice.try_into().expect("4-byte slice")))
}

/// Write encoded artifact bytes to `path` via a temporary file and an
/// atomic rename, so a reader never observes a partial artifact.
pub async fn write_artifact(path: impl AsRef<Path>, bytes: &[u8]) -> MediaResult<()> {
    fs_utils::atomic_write(path, bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> FrameSet {
        FrameSet {
            interval_ms: 10_000,
            frames: vec![
                Frame {
                    timestamp_ms: 0,
                    data: b"jpeg-one".to_vec(),
                },
                Frame {
                    timestamp_ms: 10_000,
                    data: b"jpeg-two-longer".to_vec(),
                },
                Frame {
                    timestamp_ms: 20_000,
                    data: b"j3".to_vec(),
                },
            ],
        }
    }

    #[test]
    fn test_roundtrip() {
        let set = sample_set();
        let bytes = encode(&set).unwrap();
        let index = decode(&bytes).unwrap();

        assert_eq!(index.version, VERSION);
        assert_eq!(index.interval_ms, set.interval_ms);
        assert_eq!(FrameSet::from(index), set);
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode(&sample_set()).unwrap();

        assert_eq!(&bytes[..8], &MAGIC);
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 0);
        assert_eq!(u32::from_le_bytes(bytes[12..16].try_into().unwrap()), 3);
        assert_eq!(
            u32::from_le_bytes(bytes[16..20].try_into().unwrap()),
            10_000
        );
        // Reserved region is zero-filled.
        assert!(bytes[20..64].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_index_table_offsets_relative_to_image_region() {
        let set = sample_set();
        let bytes = encode(&set).unwrap();

        // First entry: timestamp 0, offset 0.
        assert_eq!(u32::from_le_bytes(bytes[64..68].try_into().unwrap()), 0);
        assert_eq!(u32::from_le_bytes(bytes[68..72].try_into().unwrap()), 0);
        // Second entry offset = len of first image.
        assert_eq!(
            u32::from_le_bytes(bytes[76..80].try_into().unwrap()),
            8
        );
        // Sentinel closes the table with the region size.
        let sentinel_at = 64 + 8 * 3;
        assert_eq!(
            u32::from_le_bytes(bytes[sentinel_at..sentinel_at + 4].try_into().unwrap()),
            0xFFFF_FFFF
        );
        let total: usize = set.frames.iter().map(|f| f.data.len()).sum();
        assert_eq!(
            u32::from_le_bytes(bytes[sentinel_at + 4..sentinel_at + 8].try_into().unwrap()),
            total as u32
        );
        // Image region is the plain concatenation.
        assert_eq!(&bytes[sentinel_at + 8..], b"jpeg-onejpeg-two-longerj3");
    }

    #[test]
    fn test_empty_set_rejected() {
        let set = FrameSet {
            interval_ms: 10_000,
            frames: Vec::new(),
        };
        assert_eq!(encode(&set), Err(BifError::EmptyFrameSet));
    }

    #[test]
    fn test_non_monotonic_rejected_not_reordered() {
        let mut set = sample_set();
        set.frames[2].timestamp_ms = 5_000;
        assert_eq!(
            encode(&set),
            Err(BifError::NonMonotonicTimestamps { index: 2 })
        );
    }

    #[test]
    fn test_equal_timestamps_allowed() {
        let mut set = sample_set();
        set.frames[1].timestamp_ms = 0;
        set.frames[2].timestamp_ms = 0;
        assert!(encode(&set).is_ok());
    }

    #[test]
    fn test_decode_rejects_zero_frame_count() {
        let mut bytes = encode(&sample_set()).unwrap();
        bytes[12..16].copy_from_slice(&0u32.to_le_bytes());
        assert_eq!(decode(&bytes), Err(BifError::ZeroFrameCount));
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut bytes = encode(&sample_set()).unwrap();
        bytes[0] = 0x00;
        assert_eq!(decode(&bytes), Err(BifError::BadMagic));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut bytes = encode(&sample_set()).unwrap();
        bytes[8..12].copy_from_slice(&7u32.to_le_bytes());
        assert_eq!(decode(&bytes), Err(BifError::UnsupportedVersion(7)));
    }

    #[test]
    fn test_decode_rejects_truncation() {
        let bytes = encode(&sample_set()).unwrap();
        assert_eq!(decode(&bytes[..32]), Err(BifError::Truncated));
        assert_eq!(
            decode(&bytes[..bytes.len() - 3]),
            Err(BifError::Truncated)
        );
    }

    #[tokio::test]
    async fn test_write_artifact_atomic() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sub").join("index-sd.bif");
        let bytes = encode(&sample_set()).unwrap();

        write_artifact(&path, &bytes).await.unwrap();

        assert!(path.exists());
        assert_eq!(tokio::fs::read(&path).await.unwrap(), bytes);
        // No temp file left behind.
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }
}
