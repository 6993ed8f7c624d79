//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait: the handful of filesystem
//! operations the upload pipeline needs to place a staged file under a
//! managed root (existence probes, directory creation, the final move and a
//! permission change).
//!

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::staged::StagedFile;
use std::path::{Path, PathBuf};

/// Unified interface for upload destinations.
///
/// All operations are blocking. Uploads within one batch are placed strictly
/// one after another, since a later file's collision check depends on what
/// earlier files did to the tree.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations should
/// enforce this validation. The empty path refers to the root itself (only
/// meaningful for [`create_dir_all`](Self::create_dir_all)).
///
/// # Concurrency
/// Nothing here locks. Two sessions probing the same name may both see it as
/// free; the last [`place`](Self::place) wins. Directory creation is
/// idempotent, so racing creators are harmless.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use stow_storage::{StagedFile, backend::StorageBackend, error::Result};
///
/// fn store_once(backend: &dyn StorageBackend, staged: StagedFile) -> Result<bool> {
///     let path = Path::new("photo.png");
///     if backend.exists(path)? {
///         return Ok(false);
///     }
///     backend.create_dir_all(Path::new(""))?;
///     backend.place(staged, path)?;
///     Ok(true)
/// }
/// ```
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Absolute location that a relative path resolves to, without touching
    /// the filesystem.
    fn locate(&self, path: &Path) -> Result<PathBuf>;

    /// Check if a file (or directory) exists at `path`.
    ///
    /// This is a probe, not a reservation: the answer can be stale by the
    /// time the caller acts on it.
    fn exists(&self, path: &Path) -> Result<bool>;

    /// Create `dir` and all of its missing parents.
    ///
    /// Succeeds when the directory already exists.
    fn create_dir_all(&self, dir: &Path) -> Result<()>;

    /// Move a staged file to `path`, consuming it.
    ///
    /// The parent directory must already exist. An existing file at `path`
    /// is replaced. Returns the absolute, resolved location of the placed file.
    ///
    /// # Notes
    /// - The staged temp file is released whether or not the move succeeds.
    /// - Foreign (non-adopted) staged paths are refused with
    ///   [`NotStaged`](crate::error::ErrorKind::NotStaged).
    fn place(&self, staged: StagedFile, path: &Path) -> Result<PathBuf>;

    /// Set Unix permission bits on the file at `path`.
    fn set_mode(&self, path: &Path, mode: u32) -> Result<()>;
}
