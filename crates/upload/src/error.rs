//! Upload Error Types
//!
//! These are the conditions that abort a whole batch. Per-file failures are
//! not errors in this sense: they are [`UploadErrorCode`](crate::UploadErrorCode)s
//! recorded on each file's result.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An upload error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for upload operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The request carries nothing under the requested field key
    #[display("no uploaded files under key \"{_0}\"")]
    MissingInput(#[error(not(source))] String),
    /// A file's extension is not on the allow-list
    #[display("extension \"{_0}\" not allowed")]
    InvalidExtension(#[error(not(source))] String),
    /// The destination directory could not be created
    #[display("cannot create destination directory {}", _0.display())]
    CannotCreateDestination(#[error(not(source))] PathBuf),
    #[display("storage backend failure")]
    Storage,
    #[display("invalid upload configuration")]
    Config,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CannotCreateDestination(_) | Self::Storage => true,
            Self::MissingInput(_) | Self::InvalidExtension(_) | Self::Config => false,
        }
    }
}
