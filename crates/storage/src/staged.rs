//! Staged temp files awaiting placement.
//!
//! A [`StagedFile`] owns the temporary resource behind one uploaded item. It
//! is consumed exactly once: either [`persist`](StagedFile::persist)ed into
//! its destination, or dropped, which deletes the temp file. Ownership makes
//! "moved twice" unrepresentable and "left dangling" impossible without an
//! explicit leak.
//!
//! Paths handed over by a transport layer are only adopted when they look
//! like genuine staged uploads (a regular file, inside the staging directory
//! when one is configured). Anything else is kept as a *foreign* path: it is
//! never moved, and never deleted.

use crate::error::{ErrorKind, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, PathPersistError, TempPath};

/// Prefix for temp files created while staging fetched bytes.
const STAGING_PREFIX: &str = "upload";

/// Where a staged file came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    /// Handed over by the upload transport.
    Upload,
    /// Fetched from a remote URL and written locally.
    Fetched,
}

#[derive(Debug)]
enum Inner {
    Owned { path: TempPath, source: Source },
    Foreign(PathBuf),
}

/// The temp resource of one uploaded item.
#[derive(Debug)]
pub struct StagedFile {
    inner: Inner,
}
impl StagedFile {
    /// Adopt a temp file handed over by the upload transport.
    ///
    /// The file is only adopted (and therefore eligible for moving and
    /// cleanup) if it is a regular file and, when `staging_dir` is given,
    /// resolves to somewhere inside it. Otherwise the path is recorded as
    /// foreign and will be left exactly where it is.
    pub fn upload(path: impl Into<PathBuf>, staging_dir: Option<&Path>) -> Self {
        let path = path.into();
        if is_staged_upload(&path, staging_dir) {
            match TempPath::try_from_path(path.clone()) {
                Ok(temp) => {
                    return Self {
                        inner: Inner::Owned { path: temp, source: Source::Upload },
                    };
                },
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Could not take ownership of staged upload"),
            }
        } else {
            tracing::warn!(path = %path.display(), "Refusing to adopt path that is not a staged upload");
        }
        Self { inner: Inner::Foreign(path) }
    }

    /// Reserve a fresh temp file in `dir` (or the system temp directory).
    pub fn reserve(dir: Option<&Path>) -> Result<Reservation> {
        let dir = dir.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
        let file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(&dir)
            .map_err(|e| ErrorKind::from_io(e, &dir))?;
        Ok(Reservation { file })
    }

    pub fn path(&self) -> &Path {
        match &self.inner {
            Inner::Owned { path, .. } => path,
            Inner::Foreign(path) => path,
        }
    }

    /// `None` for foreign paths.
    pub fn source(&self) -> Option<Source> {
        match &self.inner {
            Inner::Owned { source, .. } => Some(*source),
            Inner::Foreign(_) => None,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.inner, Inner::Owned { .. })
    }

    /// Move the staged file to `target`, replacing anything already there.
    ///
    /// When `target` lives on another device the bytes are copied beside it
    /// first and renamed into place, so `target` is never partially written.
    /// The temp file is gone afterwards whether or not the move succeeded.
    pub fn persist(self, target: &Path) -> Result<()> {
        let path = match self.inner {
            Inner::Owned { path, .. } => path,
            Inner::Foreign(path) => exn::bail!(ErrorKind::NotStaged(path)),
        };
        match path.persist(target) {
            Ok(()) => Ok(()),
            Err(PathPersistError { error, path }) if error.kind() == std::io::ErrorKind::CrossesDevices => {
                tracing::debug!(from = %path.display(), to = %target.display(), "Rename crosses devices, copying");
                // The source TempPath is dropped (and removed) on every path out of here.
                copy_into_place(&path, target)
            },
            Err(PathPersistError { error, .. }) => Err(ErrorKind::from_io(error, target).into()),
        }
    }

    /// Release the temp resource without placing it.
    pub fn discard(self) {
        if let Inner::Owned { path, .. } = self.inner
            && let Err(e) = path.close()
        {
            tracing::warn!(error = %e, "Could not remove staged temp file");
        }
    }
}

/// A reserved, still-empty temp file. Dropping it removes the file.
pub struct Reservation {
    file: NamedTempFile,
}
impl Reservation {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Write `bytes` and turn the reservation into a [`StagedFile`].
    pub fn write(mut self, bytes: &[u8]) -> Result<StagedFile> {
        let path = self.file.path().to_path_buf();
        self.file.write_all(bytes).map_err(|e| ErrorKind::from_io(e, &path))?;
        self.file.flush().map_err(|e| ErrorKind::from_io(e, &path))?;
        Ok(StagedFile {
            inner: Inner::Owned {
                path: self.file.into_temp_path(),
                source: Source::Fetched,
            },
        })
    }
}

/// Copy `source` next to `target`, then rename it into place, so that
/// `target` never holds a partial file.
fn copy_into_place(source: &Path, target: &Path) -> Result<()> {
    let dir = match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut copy = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| ErrorKind::from_io(e, dir))?;
    let mut reader = fs::File::open(source).map_err(|e| ErrorKind::from_io(e, source))?;
    io::copy(&mut reader, copy.as_file_mut()).map_err(|e| ErrorKind::from_io(e, target))?;
    copy.as_file().sync_all().map_err(|e| ErrorKind::from_io(e, target))?;
    copy.persist(target).map_err(|e| ErrorKind::from_io(e.error, target))?;
    Ok(())
}

fn is_staged_upload(path: &Path, staging_dir: Option<&Path>) -> bool {
    // symlink_metadata: a symlink to somewhere else is not a staged upload.
    let Ok(meta) = fs::symlink_metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    match staging_dir {
        None => true,
        Some(dir) => match (fs::canonicalize(path), fs::canonicalize(dir)) {
            (Ok(file), Ok(dir)) => file.starts_with(dir),
            _ => false,
        },
    }
}
