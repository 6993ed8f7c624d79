//! Local filesystem storage backend.
//!
//! This module provides a storage backend implementation for the local filesystem.
//! Files are placed under a configured directory using blocking `std::fs` calls.

use crate::error::{ErrorKind, Result};
use crate::staged::StagedFile;
use crate::{StorageBackend, path::validate as validate_path};
use std::fs;
use std::path::{Path, PathBuf};

/// Local filesystem storage backend.
///
/// Stores files in a directory on the local filesystem. All paths are relative
/// to the configured root directory.
///
/// # Examples
///
/// ```no_run
/// use stow_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("local", "/srv/uploads")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalBackend {
    name: String,
    /// Root directory for uploads
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// Relative roots are resolved against the current working directory.
    /// The root does not need to exist yet; it is created on the first
    /// [`create_dir_all`](StorageBackend::create_dir_all).
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPath`](ErrorKind::InvalidPath) if the root exists but
    /// is not a directory, or cannot be made absolute.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = std::path::absolute(root).map_err(|_| ErrorKind::InvalidPath(root.to_path_buf()))?;
        if root.exists() && !root.is_dir() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the absolute path for a relative storage path.
    ///
    /// Validates the path and joins it with the root directory.
    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    /// Same as [`absolute_path`](Self::absolute_path), except the empty path
    /// means the root itself.
    fn absolute_dir(&self, dir: &Path) -> Result<PathBuf> {
        match dir.as_os_str().is_empty() {
            true => Ok(self.root.clone()),
            false => self.absolute_path(dir),
        }
    }
}

impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn locate(&self, path: &Path) -> Result<PathBuf> {
        self.absolute_dir(path)
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::exists(&abs_path).map_err(ErrorKind::Io)?)
    }

    fn create_dir_all(&self, dir: &Path) -> Result<()> {
        let abs_dir = self.absolute_dir(dir)?;
        if abs_dir.is_dir() {
            return Ok(());
        }
        tracing::debug!(backend = %self.name, dir = %abs_dir.display(), "Creating destination directory");
        match fs::create_dir_all(&abs_dir) {
            Ok(()) => Ok(()),
            // Another session may have won the race; that still counts.
            Err(_) if abs_dir.is_dir() => Ok(()),
            Err(e) => Err(ErrorKind::from_io(e, &abs_dir).into()),
        }
    }

    fn place(&self, staged: StagedFile, path: &Path) -> Result<PathBuf> {
        let target = self.absolute_path(path)?;
        staged.persist(&target)?;
        Ok(fs::canonicalize(&target).unwrap_or(target))
    }

    #[cfg(unix)]
    fn set_mode(&self, path: &Path, mode: u32) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let abs_path = self.absolute_path(path)?;
        Ok(fs::set_permissions(&abs_path, fs::Permissions::from_mode(mode))
            .map_err(|e| ErrorKind::from_io(e, path))?)
    }

    #[cfg(not(unix))]
    fn set_mode(&self, path: &Path, mode: u32) -> Result<()> {
        tracing::trace!(path = %path.display(), mode = %format!("{mode:o}"), "Permission bits unsupported on this platform");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(dir: &Path, data: &[u8]) -> StagedFile {
        let path = dir.join(format!("php{}", data.len()));
        fs::write(&path, data).unwrap();
        StagedFile::upload(path, Some(dir))
    }

    #[test]
    fn test_new_resolves_relative_root() {
        let backend = LocalBackend::new("name", "relative/uploads").unwrap();
        assert!(backend.root().is_absolute());
        assert!(backend.root().ends_with("relative/uploads"));
    }

    #[test]
    fn test_new_rejects_file_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("file");
        fs::write(&file, b"").unwrap();
        let err = LocalBackend::new("name", &file).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[test]
    fn test_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let expected = temp_dir.path().join("abc/photo.png");
        assert_eq!(backend.absolute_path(Path::new("abc/photo.png")).unwrap(), expected);
        // Path traversal is prevented
        assert!(backend.absolute_path(Path::new("../etc/passwd")).is_err());
        // Empty path is the root, but only for directories
        assert_eq!(backend.locate(Path::new("")).unwrap(), temp_dir.path());
        assert!(backend.exists(Path::new("")).is_err());
    }

    #[test]
    fn test_exists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        assert!(!backend.exists(Path::new("nonexistent.png")).unwrap());
        fs::write(temp_dir.path().join("exists.png"), b"data").unwrap();
        assert!(backend.exists(Path::new("exists.png")).unwrap());
    }

    #[test]
    fn test_create_dir_all_is_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path().join("uploads")).unwrap();
        backend.create_dir_all(Path::new("")).unwrap();
        backend.create_dir_all(Path::new("a1b/c2d")).unwrap();
        backend.create_dir_all(Path::new("a1b/c2d")).unwrap();
        assert!(temp_dir.path().join("uploads/a1b/c2d").is_dir());
    }

    #[test]
    fn test_create_dir_all_blocked_by_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        fs::write(temp_dir.path().join("blocker"), b"").unwrap();
        assert!(backend.create_dir_all(Path::new("blocker/sub")).is_err());
    }

    #[test]
    fn test_place() {
        let temp_dir = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let staged = staged(staging.path(), b"png bytes");
        let source = staged.path().to_path_buf();
        let placed = backend.place(staged, Path::new("photo.png")).unwrap();
        assert_eq!(placed, fs::canonicalize(temp_dir.path().join("photo.png")).unwrap());
        assert_eq!(fs::read(&placed).unwrap(), b"png bytes");
        assert!(!source.exists());
    }

    #[test]
    fn test_place_overwrites() {
        let temp_dir = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        fs::write(temp_dir.path().join("photo.png"), b"old").unwrap();
        backend.place(staged(staging.path(), b"new"), Path::new("photo.png")).unwrap();
        assert_eq!(fs::read(temp_dir.path().join("photo.png")).unwrap(), b"new");
    }

    #[test]
    fn test_place_rejects_traversal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let err = backend.place(staged(staging.path(), b"x"), Path::new("../escape.png")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_set_mode() {
        use std::os::unix::fs::PermissionsExt;
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        fs::write(temp_dir.path().join("photo.png"), b"data").unwrap();
        backend.set_mode(Path::new("photo.png"), 0o640).unwrap();
        let mode = fs::metadata(temp_dir.path().join("photo.png")).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o640);
    }
}
