//! The per-file lifecycle, run across a batch.
//!
//! ```text
//! pending ──transport error──────────────────────────────► failed
//!    │
//!    ├─ before_validate → validators → after_validate ──► failed (soft)
//!    │                         └── bad extension ───────► abort batch
//!    ▼
//! validated ── name ──► named ── exists? ───────────────► failed
//!                         │
//!                         ├─ before_upload → mkdir ─────► abort batch
//!                         ▼
//!                       move ───────────────────────────► failed
//!                         ▼
//!                       moved → after_upload
//! ```
//!
//! Files run strictly in input order: a later file's collision probe has to
//! see what earlier files did to the destination.

use crate::code::UploadErrorCode;
use crate::error::{Error, ErrorKind};
use crate::file::{FileDescriptor, FileRecord};
use crate::hooks::{SessionView, UploadHooks};
use crate::name::{NameFormatter, NameStrategy};
use crate::validate::ValidatorChain;
use stow_config::UploadConfig;
use stow_storage::{StorageBackend, shard};
use tracing::instrument;

/// Everything a batch left behind.
#[derive(Debug)]
pub struct Batch {
    /// One record per input file, in input order.
    pub records: Vec<FileRecord>,
    /// Most recent failure recorded in the batch.
    pub error_code: UploadErrorCode,
    /// Why the batch stopped early, if it did.
    pub aborted: Option<Error>,
}

enum Step {
    Done(FileDescriptor),
    Abort(FileDescriptor, Error),
}

pub struct UploadPipeline<'a> {
    config: &'a UploadConfig,
    backend: &'a dyn StorageBackend,
    validators: ValidatorChain,
    hooks: &'a dyn UploadHooks,
    formatter: Option<&'a dyn NameFormatter>,
}
impl<'a> UploadPipeline<'a> {
    pub fn new(config: &'a UploadConfig, backend: &'a dyn StorageBackend, hooks: &'a dyn UploadHooks) -> Self {
        Self {
            config,
            backend,
            validators: ValidatorChain::from_config(config),
            hooks,
            formatter: None,
        }
    }

    pub fn with_formatter(mut self, formatter: Option<&'a dyn NameFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Process `files` in order.
    ///
    /// Soft failures are recorded and the batch moves on. A fatal error stops
    /// the batch: files already moved stay moved, the remaining ones are
    /// returned untouched (`pending`) with their temp files released.
    #[instrument(skip_all, fields(backend = %self.backend.name(), files = files.len()))]
    pub fn run(&self, files: Vec<FileDescriptor>) -> Batch {
        let mut records = Vec::with_capacity(files.len());
        let mut error_code = UploadErrorCode::NoError;
        let mut aborted = None;
        let mut files = files.into_iter();
        for file in files.by_ref() {
            let file = match self.process(file, &records) {
                Step::Done(file) => file,
                Step::Abort(file, err) => {
                    tracing::warn!(file = %file.original_name, error = ?err, "Upload batch aborted");
                    aborted = Some(err);
                    file
                },
            };
            if file.error_code().is_error() {
                error_code = file.error_code();
            }
            records.push(file.finish());
            if aborted.is_some() {
                break;
            }
        }
        records.extend(files.map(FileDescriptor::finish));
        Batch { records, error_code, aborted }
    }

    fn process(&self, mut file: FileDescriptor, processed: &[FileRecord]) -> Step {
        if file.is_failed() {
            tracing::warn!(file = %file.original_name, reason = %file.error_code(), "File failed before processing");
            return Step::Done(file);
        }
        let session = SessionView::new(self.config, self.backend, processed);

        self.hooks.before_validate(&mut file, &session);
        if let Err(err) = self.validators.apply(&mut file) {
            return Step::Abort(file, err);
        }
        self.hooks.after_validate(&mut file, &session);
        if file.is_failed() {
            return Step::Done(file);
        }

        let naming = NameStrategy::new(self.config, self.formatter, self.backend);
        let name = match naming.resolve(&file) {
            Ok(name) => name,
            Err(code) => {
                file.fail(code);
                return Step::Done(file);
            },
        };
        let directory = shard::directory(&name, self.config.shard_depth());
        let path = directory.join(&name);
        file.assign_name(name);

        if !self.config.overwrite() && self.is_taken(&path) {
            tracing::warn!(file = %file.original_name, path = %path.display(), "Destination file already exists");
            file.fail(UploadErrorCode::FilenameExists);
            return Step::Done(file);
        }

        self.hooks.before_upload(&mut file, &session);
        if file.is_failed() {
            return Step::Done(file);
        }

        if let Err(err) = self.backend.create_dir_all(&directory) {
            let location = self.backend.locate(&directory).unwrap_or(directory);
            file.fail(UploadErrorCode::CannotCreateDestination);
            return Step::Abort(file, err.raise(ErrorKind::CannotCreateDestination(location)));
        }

        match file.take_staged() {
            Some(staged) => match self.backend.place(staged, &path) {
                Ok(full_path) => {
                    if let Err(err) = self.backend.set_mode(&path, self.config.file_mode()) {
                        tracing::warn!(path = %full_path.display(), error = ?err, "Could not set file permissions");
                    }
                    tracing::info!(file = %file.original_name, path = %full_path.display(), "Stored uploaded file");
                    file.mark_moved(full_path);
                },
                Err(err) => {
                    tracing::warn!(file = %file.original_name, path = %path.display(), error = ?err, "Could not move uploaded file");
                    file.fail(UploadErrorCode::CannotMoveFile);
                },
            },
            None => file.fail(UploadErrorCode::CannotMoveFile),
        }

        self.hooks.after_upload(&mut file, &session);
        Step::Done(file)
    }

    /// Existence probe for the overwrite check; an unanswerable probe counts as taken.
    fn is_taken(&self, path: &std::path::Path) -> bool {
        self.backend.exists(path).unwrap_or_else(|err| {
            tracing::debug!(path = %path.display(), error = ?err, "Could not probe destination");
            true
        })
    }
}
