//! Hash-derived directory sharding.
//!
//! Large upload trees get slow when every file lands in one directory. A
//! shard path spreads files across nested subdirectories named after groups
//! of a digest of the file name, so that the same name always maps to the
//! same place:
//!
//! ```text
//! photo_66f2a1c3e9b04.png  →  blake3 (first 128 bits, hex)
//!                          →  "8c1" / "f0a" / "27d" / ...
//! depth = 2                →  8c1/f0a/photo_66f2a1c3e9b04.png
//! ```

use std::path::PathBuf;

/// Number of digest bytes used for shard names (128 bits).
const DIGEST_BYTES: usize = 16;
/// Width of a single directory segment, in hex characters.
const SEGMENT_WIDTH: usize = 3;
/// Number of segments available from one digest. The last one is shorter
/// (32 hex characters split into groups of 3).
pub const MAX_DEPTH: usize = (DIGEST_BYTES * 2).div_ceil(SEGMENT_WIDTH);

/// Hex-encoded 128-bit digest of a file name.
fn digest(file_name: &str) -> String {
    let hash = blake3::hash(file_name.as_bytes());
    hash.as_bytes()[..DIGEST_BYTES].iter().map(|b| format!("{b:02x}")).collect()
}

/// Ordered directory segments for `file_name` at the given `depth`.
///
/// Depth `0` disables sharding and returns no segments. Depths beyond
/// [`MAX_DEPTH`] are clamped, since the digest has nothing more to give.
///
/// ```
/// use stow_storage::shard;
/// let segments = shard::segments("photo.png", 2);
/// assert_eq!(segments.len(), 2);
/// assert!(segments.iter().all(|s| s.len() == 3));
/// assert!(shard::segments("photo.png", 0).is_empty());
/// ```
pub fn segments(file_name: &str, depth: usize) -> Vec<String> {
    if depth == 0 {
        return Vec::new();
    }
    let digest = digest(file_name);
    // The digest is ASCII hex, so chunking on bytes never splits a character.
    digest
        .as_bytes()
        .chunks(SEGMENT_WIDTH)
        .take(depth)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}

/// Relative directory for `file_name` at the given `depth` (empty when
/// sharding is disabled).
pub fn directory(file_name: &str, depth: usize) -> PathBuf {
    segments(file_name, depth).into_iter().collect()
}
