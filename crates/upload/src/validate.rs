//! The validator chain.
//!
//! MIME and size violations are soft: they are recorded on the file and the
//! batch carries on. An extension violation is fatal for the whole batch,
//! since it means somebody sent a kind of file that is never acceptable.

use crate::code::UploadErrorCode;
use crate::error::{ErrorKind, Result};
use crate::file::{FileDescriptor, Status};
use stow_config::{AllowList, UploadConfig, ValidatorSpec};

/// What one validator thinks of one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// Soft failure for this file only.
    Reject(UploadErrorCode),
    /// Abort the batch.
    Abort,
}

/// A runnable check built from a [`ValidatorSpec`].
#[derive(Clone, Debug)]
pub enum Validator {
    Mime(AllowList),
    Size(u64),
    Extension(AllowList),
}
impl From<&ValidatorSpec> for Validator {
    fn from(spec: &ValidatorSpec) -> Self {
        match spec {
            ValidatorSpec::Mime(allowed) => Self::Mime(allowed.clone()),
            ValidatorSpec::Size(limit) => Self::Size(limit.bytes()),
            ValidatorSpec::Extension(allowed) => Self::Extension(allowed.clone()),
        }
    }
}
impl Validator {
    pub fn check(&self, file: &FileDescriptor) -> Verdict {
        match self {
            Self::Mime(allowed) if !allowed.contains(&file.mime_type) => Verdict::Reject(UploadErrorCode::InvalidMimeType),
            Self::Size(limit) if file.size > *limit => Verdict::Reject(UploadErrorCode::FileTooLarge),
            Self::Extension(allowed) if !allowed.contains_ignore_case(&file.extension) => Verdict::Abort,
            _ => Verdict::Pass,
        }
    }
}

/// Ordered validators, shared read-only by every file of a batch.
#[derive(Clone, Debug, Default)]
pub struct ValidatorChain {
    validators: Vec<Validator>,
    fail_fast: bool,
}
impl ValidatorChain {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            validators: config.validators().iter().map(Validator::from).collect(),
            fail_fast: config.fail_fast(),
        }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Run every validator against `file`, in order.
    ///
    /// Soft failures are recorded on the file (the first one wins). With
    /// `fail_fast` the chain stops at the first of them. An extension
    /// violation marks the file failed and returns the batch-aborting error.
    pub fn apply(&self, file: &mut FileDescriptor) -> Result<()> {
        for validator in &self.validators {
            match validator.check(file) {
                Verdict::Pass => {},
                Verdict::Reject(code) => {
                    tracing::warn!(file = %file.original_name, reason = %code, "File rejected by validator");
                    file.fail(code);
                    if self.fail_fast {
                        return Ok(());
                    }
                },
                Verdict::Abort => {
                    file.fail(UploadErrorCode::InvalidExtension);
                    exn::bail!(ErrorKind::InvalidExtension(file.extension.to_lowercase()));
                },
            }
        }
        file.advance(Status::Validated);
        Ok(())
    }
}
