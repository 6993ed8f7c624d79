//! Path validation and security utilities.
//!
//! Destination paths are always relative to a backend root. Anything that
//! would climb out of that root, or that smuggles separators into what should
//! be a single file name, is rejected here before it reaches the filesystem.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage path for security and correctness.
/// Ensures that paths don't escape the storage root (no `..` traversal).
///
/// > **Note:** This does **not** normalize backslashes or non-UTF8 bytes.
/// >           Null bytes are explicitly rejected.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use stow_storage::validate_path;
/// // Valid paths
/// assert!(validate_path("a1b/2c3/photo.png").is_ok());
/// assert!(validate_path("a/../photo.png").is_ok()); // (never leaves root)
/// // Invalid paths
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err()); // (leaves root)
/// assert!(validate_path("a\0b").is_err());
/// // Paths get resolved
/// assert_eq!(
///     validate_path("wrong/../still-wrong/.././correct//./photo.png/").unwrap(),
///     Path::new("correct/photo.png")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls, reject them explicitly.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Validates that `name` is usable as a single file name inside a directory.
///
/// Unlike [`validate`], nothing is normalized: the name must already be one
/// plain component. Separators (either flavour, regardless of platform), `.`,
/// `..`, empty names and null bytes are all rejected.
///
/// ```
/// use stow_storage::validate_file_name;
/// assert!(validate_file_name("photo.png").is_ok());
/// assert!(validate_file_name(".htaccess").is_ok());
/// assert!(validate_file_name("../photo.png").is_err());
/// assert!(validate_file_name("a\\b.png").is_err());
/// assert!(validate_file_name("..").is_err());
/// ```
pub fn validate_file_name(name: &str) -> Result<&str> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || !matches!(Path::new(name).components().next(), Some(Component::Normal(_)));
    match invalid {
        true => exn::bail!(ErrorKind::InvalidPath(PathBuf::from(name))),
        false => Ok(name),
    }
}
