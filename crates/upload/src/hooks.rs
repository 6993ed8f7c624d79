//! Lifecycle hooks.
//!
//! Hooks see each file at four points of the pipeline and may change the
//! descriptor's public fields, or [`fail`](FileDescriptor::fail) it (a
//! content scanner would do this from
//! [`after_validate`](UploadHooks::after_validate)). A file failed by
//! `before_upload` is not moved.

use crate::file::{FileDescriptor, FileRecord};
use std::path::{Path, PathBuf};
use stow_config::UploadConfig;
use stow_storage::StorageBackend;

/// Read-only view of the session running a batch.
#[derive(Clone, Copy)]
pub struct SessionView<'a> {
    config: &'a UploadConfig,
    backend: &'a dyn StorageBackend,
    processed: &'a [FileRecord],
}
impl<'a> SessionView<'a> {
    pub(crate) fn new(config: &'a UploadConfig, backend: &'a dyn StorageBackend, processed: &'a [FileRecord]) -> Self {
        Self { config, backend, processed }
    }

    pub fn config(&self) -> &'a UploadConfig {
        self.config
    }

    /// Absolute destination root, as the backend resolves it.
    pub fn destination(&self) -> Option<PathBuf> {
        self.backend.locate(Path::new("")).ok()
    }

    /// Files of the current batch that are already through the pipeline,
    /// in input order.
    pub fn processed(&self) -> &'a [FileRecord] {
        self.processed
    }
}

pub trait UploadHooks: Send + Sync {
    fn before_validate(&self, _file: &mut FileDescriptor, _session: &SessionView<'_>) {}

    fn after_validate(&self, _file: &mut FileDescriptor, _session: &SessionView<'_>) {}

    fn before_upload(&self, _file: &mut FileDescriptor, _session: &SessionView<'_>) {}

    /// Runs for every file that got as far as the move, moved or not.
    fn after_upload(&self, _file: &mut FileDescriptor, _session: &SessionView<'_>) {}
}

/// Hooks that do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHooks;
impl UploadHooks for NoopHooks {}
