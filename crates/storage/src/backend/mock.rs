//! In-memory storage backend for testing.

use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use crate::staged::StagedFile;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Pretend root that placed paths are reported under.
const MOCK_ROOT: &str = "/mock";

#[derive(Clone, Copy, Debug, Default)]
struct Faults {
    dirs: bool,
    moves: bool,
    occupied: bool,
}

/// In-memory storage backend for testing.
///
/// Placed files are read out of their staged temp file into a `HashMap`
/// behind a [`RwLock`], so all trait methods can operate on `&self`. Faults
/// can be switched on to exercise failure paths that are awkward to provoke
/// on a real filesystem.
///
/// # Examples
///
/// ```
/// use stow_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// let backend = MockBackend::with_files([("abc/photo.png", b"png")]);
/// assert!(backend.exists(Path::new("abc/photo.png")).unwrap());
///
/// let backend = MockBackend::default().failing_dirs();
/// assert!(backend.create_dir_all(Path::new("abc")).is_err());
/// ```
pub struct MockBackend {
    name: String,
    files: RwLock<HashMap<PathBuf, (Vec<u8>, Option<u32>)>>,
    dirs: RwLock<HashSet<PathBuf>>,
    faults: Faults,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                // The panic here is DELIBERATE. MockBackend is intended to be
                // used in tests; panics are expected. There is no error result.
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (data.into(), None));
        }
        Self {
            name: "mock".to_string(),
            files: RwLock::new(map),
            dirs: RwLock::new(HashSet::new()),
            faults: Faults::default(),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Every directory creation fails with permission denied.
    pub fn failing_dirs(mut self) -> Self {
        self.faults.dirs = true;
        self
    }

    /// Every placement fails (the staged file is still released).
    pub fn failing_moves(mut self) -> Self {
        self.faults.moves = true;
        self
    }

    /// Every existence probe answers "taken".
    pub fn always_occupied(mut self) -> Self {
        self.faults.occupied = true;
        self
    }

    /// Contents of a placed (or pre-populated) file.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let path = validate_path(path.as_ref()).ok()?;
        self.files.read().ok()?.get(&path).map(|(data, _)| data.clone())
    }

    /// Permission bits last set on a file.
    pub fn mode(&self, path: impl AsRef<Path>) -> Option<u32> {
        let path = validate_path(path.as_ref()).ok()?;
        self.files.read().ok()?.get(&path).and_then(|(_, mode)| *mode)
    }

    /// Sorted paths of every stored file.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.files.read().map(|files| files.keys().cloned().collect()).unwrap_or_default();
        paths.sort();
        paths
    }

    /// Whether `dir` was created through [`create_dir_all`](StorageBackend::create_dir_all).
    pub fn has_dir(&self, dir: impl AsRef<Path>) -> bool {
        self.dirs.read().is_ok_and(|dirs| dirs.contains(dir.as_ref()))
    }

    fn poisoned() -> ErrorKind {
        ErrorKind::BackendError("mock storage lock poisoned".to_string())
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn locate(&self, path: &Path) -> Result<PathBuf> {
        match path.as_os_str().is_empty() {
            true => Ok(PathBuf::from(MOCK_ROOT)),
            false => Ok(Path::new(MOCK_ROOT).join(validate_path(path)?)),
        }
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        if self.faults.occupied {
            return Ok(true);
        }
        let in_files = self.files.read().map_err(|_| Self::poisoned())?.contains_key(&path);
        Ok(in_files || self.dirs.read().map_err(|_| Self::poisoned())?.contains(&path))
    }

    fn create_dir_all(&self, dir: &Path) -> Result<()> {
        if self.faults.dirs {
            exn::bail!(ErrorKind::PermissionDenied(dir.to_path_buf()));
        }
        if dir.as_os_str().is_empty() {
            return Ok(());
        }
        let dir = validate_path(dir)?;
        let mut dirs = self.dirs.write().map_err(|_| Self::poisoned())?;
        for ancestor in dir.ancestors().filter(|a| !a.as_os_str().is_empty()) {
            dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn place(&self, staged: StagedFile, path: &Path) -> Result<PathBuf> {
        let path = validate_path(path)?;
        if !staged.is_owned() {
            exn::bail!(ErrorKind::NotStaged(staged.path().to_path_buf()));
        }
        if self.faults.moves {
            staged.discard();
            exn::bail!(ErrorKind::BackendError(format!("refusing to place {}", path.display())));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty())
            && !self.has_dir(parent)
        {
            staged.discard();
            exn::bail!(ErrorKind::NotFound(parent.to_path_buf()));
        }
        let data = std::fs::read(staged.path()).map_err(|e| ErrorKind::from_io(e, staged.path()))?;
        staged.discard();
        self.files.write().map_err(|_| Self::poisoned())?.insert(path.clone(), (data, None));
        Ok(Path::new(MOCK_ROOT).join(path))
    }

    fn set_mode(&self, path: &Path, mode: u32) -> Result<()> {
        let path = validate_path(path)?;
        let mut files = self.files.write().map_err(|_| Self::poisoned())?;
        let (_, current) = files.get_mut(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        *current = Some(mode);
        Ok(())
    }
}
