//! Configuration Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A configuration source could not be read or parsed
    #[display("could not load configuration from {}", _0.display())]
    Load(#[error(not(source))] PathBuf),
    /// Configuration values are individually valid but make no sense
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// No home directory to derive the default configuration path from
    #[display("could not determine configuration directory")]
    NoConfigDirectory,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Load(_) => true,
            Self::Invalid(_) | Self::NoConfigDirectory => false,
        }
    }
}
