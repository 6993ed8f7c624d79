//! Per-file state carried through the pipeline, and the record left behind.

use crate::code::{TransportStatus, UploadErrorCode};
use serde::Serialize;
use std::path::{Path, PathBuf};
use stow_storage::StagedFile;

/// Where a file is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Not processed (yet, or ever if the batch aborted first).
    #[default]
    Pending,
    Validated,
    Named,
    Moved,
    Failed,
}

/// Split a file name into base name and extension, on the last dot of its
/// final path component.
///
/// ```
/// use stow_upload::split_name;
/// assert_eq!(split_name("archive.tar.gz"), ("archive.tar", "gz"));
/// assert_eq!(split_name("README"), ("README", ""));
/// assert_eq!(split_name(".htaccess"), ("", "htaccess"));
/// ```
pub fn split_name(full_name: &str) -> (&str, &str) {
    let file_name = full_name.rsplit(['/', '\\']).next().unwrap_or(full_name);
    match file_name.rsplit_once('.') {
        Some((base, extension)) => (base, extension),
        None => (file_name, ""),
    }
}

/// One staged file as an upload transport hands it over.
#[derive(Clone, Debug, Default)]
pub struct TransportFile {
    /// Client supplied file name.
    pub name: String,
    /// Client supplied MIME type (untrusted).
    pub mime_type: String,
    /// Where the transport staged the bytes.
    pub tmp_path: PathBuf,
    pub size: u64,
    pub status: TransportStatus,
}
impl TransportFile {
    pub fn new(name: impl Into<String>, tmp_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            tmp_path: tmp_path.into(),
            ..Default::default()
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_status(mut self, status: TransportStatus) -> Self {
        self.status = status;
        self
    }
}

/// A file moving through the upload pipeline.
///
/// The public fields are what validators and naming read; lifecycle hooks
/// may change them. Everything else only changes as the pipeline advances.
/// The descriptor owns the staged temp file, so consuming the descriptor
/// releases it.
#[derive(Debug)]
pub struct FileDescriptor {
    pub original_name: String,
    pub base_name: String,
    pub extension: String,
    pub mime_type: String,
    pub size: u64,
    staged: Option<StagedFile>,
    tmp_name: PathBuf,
    new_name: Option<String>,
    full_path: Option<PathBuf>,
    status: Status,
    error: UploadErrorCode,
}
impl FileDescriptor {
    /// Describe a staged file. A transport failure is recorded straight away.
    pub fn new(
        original_name: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
        staged: Option<StagedFile>,
        transport: TransportStatus,
    ) -> Self {
        let original_name = original_name.into();
        let (base_name, extension) = split_name(&original_name);
        let (base_name, extension) = (base_name.to_string(), extension.to_string());
        let tmp_name = staged.as_ref().map(|s| s.path().to_path_buf()).unwrap_or_default();
        let mut file = Self {
            original_name,
            base_name,
            extension,
            mime_type: mime_type.into(),
            size,
            staged,
            tmp_name,
            new_name: None,
            full_path: None,
            status: Status::Pending,
            error: UploadErrorCode::NoError,
        };
        if let Some(code) = transport.error_code() {
            file.fail(code);
        }
        file
    }

    /// Adopt a transport file, checking its temp path against `staging_dir`.
    ///
    /// Temp paths of failed transfers are not adopted at all: the transport
    /// still owns whatever may be there.
    pub fn from_transport(file: TransportFile, staging_dir: Option<&Path>) -> Self {
        let staged = match file.status {
            TransportStatus::Ok => Some(StagedFile::upload(&file.tmp_path, staging_dir)),
            _ => None,
        };
        let mut descriptor = Self::new(file.name, file.mime_type, file.size, staged, file.status);
        descriptor.tmp_name = file.tmp_path;
        descriptor
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// First failure recorded for this file.
    pub fn error_code(&self) -> UploadErrorCode {
        self.error
    }

    /// Name assigned by the naming step.
    pub fn new_name(&self) -> Option<&str> {
        self.new_name.as_deref()
    }

    /// Absolute location of the stored file, once moved.
    pub fn full_path(&self) -> Option<&Path> {
        self.full_path.as_deref()
    }

    pub fn tmp_name(&self) -> &Path {
        &self.tmp_name
    }

    pub fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }

    /// Record a failure. Only the first one sticks, and a moved file stays moved.
    pub fn fail(&mut self, code: UploadErrorCode) {
        if !code.is_error() || self.status == Status::Moved {
            return;
        }
        if !self.error.is_error() {
            self.error = code;
        }
        self.status = Status::Failed;
    }

    pub(crate) fn advance(&mut self, status: Status) {
        if !self.is_failed() {
            self.status = status;
        }
    }

    pub(crate) fn assign_name(&mut self, name: String) {
        self.new_name = Some(name);
        self.advance(Status::Named);
    }

    pub(crate) fn take_staged(&mut self) -> Option<StagedFile> {
        self.staged.take()
    }

    pub(crate) fn mark_moved(&mut self, full_path: PathBuf) {
        self.full_path = Some(full_path);
        self.status = Status::Moved;
    }

    /// Release the temp resource (if still held) and keep the record.
    pub fn finish(mut self) -> FileRecord {
        if let Some(staged) = self.staged.take() {
            staged.discard();
        }
        FileRecord {
            name: self.base_name,
            full_name: self.original_name,
            new_name: self.new_name,
            full_path: self.full_path,
            extension: self.extension,
            mime_type: self.mime_type,
            tmp_name: self.tmp_name,
            size: self.size,
            error_code: self.error,
            status: self.status,
        }
    }
}

/// What the caller gets back for each file of a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Base name, without extension.
    pub name: String,
    /// Original file name.
    pub full_name: String,
    /// Assigned name, if naming got that far.
    pub new_name: Option<String>,
    /// Absolute path of the stored file, set only when moved.
    pub full_path: Option<PathBuf>,
    pub extension: String,
    pub mime_type: String,
    pub tmp_name: PathBuf,
    pub size: u64,
    pub error_code: UploadErrorCode,
    pub status: Status,
}
impl FileRecord {
    pub fn is_moved(&self) -> bool {
        self.status == Status::Moved
    }
}
