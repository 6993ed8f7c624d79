//! Per-file result codes and their messages.
//!
//! The numeric values are stable: `0..=8` are the codes upload transports
//! use for their own failures, everything from `50` up is raised by the
//! pipeline itself.

use serde::{Serialize, Serializer};
use std::fmt;

/// Outcome code recorded on every file of a batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UploadErrorCode {
    #[default]
    NoError = 0,
    ServerSizeExceeded = 1,
    FormSizeExceeded = 2,
    Partial = 3,
    NoFile = 4,
    MissingTempDir = 6,
    WriteFailure = 7,
    BlockedByHost = 8,
    FileTooLarge = 50,
    InvalidMimeType = 51,
    InvalidExtension = 52,
    InvalidFormatterResult = 53,
    FilenameExists = 54,
    NoAvailableName = 55,
    CannotGetRemoteFile = 56,
    CannotMoveFile = 57,
    CannotCreateDestination = 58,
    InvalidFileName = 59,
}

/// Human readable message for every code.
static MESSAGES: [(UploadErrorCode, &str); 18] = [
    (UploadErrorCode::NoError, "No errors"),
    (UploadErrorCode::ServerSizeExceeded, "File size exceeds the server upload limit"),
    (UploadErrorCode::FormSizeExceeded, "File size exceeds the html form MAX_FILE_SIZE directive"),
    (UploadErrorCode::Partial, "The uploaded file was only partially uploaded"),
    (UploadErrorCode::NoFile, "No file was uploaded"),
    (UploadErrorCode::MissingTempDir, "Missing a temporary folder"),
    (UploadErrorCode::WriteFailure, "Failed to write file to disk"),
    (UploadErrorCode::BlockedByHost, "A server extension stopped the file upload"),
    (UploadErrorCode::FileTooLarge, "Validator: file too large"),
    (UploadErrorCode::InvalidMimeType, "Validator: restricted mime-type"),
    (UploadErrorCode::InvalidExtension, "Validator: restricted extension"),
    (UploadErrorCode::InvalidFormatterResult, "Formatter function must return filename"),
    (UploadErrorCode::FilenameExists, "File with the same name already exists"),
    (UploadErrorCode::NoAvailableName, "Cannot find available name for uploaded file"),
    (UploadErrorCode::CannotGetRemoteFile, "Cannot get file content from URL"),
    (UploadErrorCode::CannotMoveFile, "Cannot move uploaded file"),
    (UploadErrorCode::CannotCreateDestination, "Cannot create destination directory"),
    (UploadErrorCode::InvalidFileName, "Assigned file name is not a plain file name"),
];

impl UploadErrorCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        MESSAGES.iter().map(|(kind, _)| *kind).find(|kind| kind.code() == code)
    }

    pub fn message(self) -> &'static str {
        MESSAGES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map_or("Unknown upload error", |(_, message)| *message)
    }

    pub fn is_error(self) -> bool {
        self != Self::NoError
    }

    /// Every code, in numeric order.
    pub fn all() -> impl Iterator<Item = Self> {
        MESSAGES.iter().map(|(kind, _)| *kind)
    }
}
impl fmt::Display for UploadErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
impl Serialize for UploadErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Status an upload transport reports for one staged file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportStatus {
    #[default]
    Ok,
    ServerSizeExceeded,
    FormSizeExceeded,
    Partial,
    NoFile,
    MissingTempDir,
    WriteFailure,
    BlockedByHost,
}
impl TransportStatus {
    /// `None` when the transfer succeeded.
    pub fn error_code(self) -> Option<UploadErrorCode> {
        match self {
            Self::Ok => None,
            Self::ServerSizeExceeded => Some(UploadErrorCode::ServerSizeExceeded),
            Self::FormSizeExceeded => Some(UploadErrorCode::FormSizeExceeded),
            Self::Partial => Some(UploadErrorCode::Partial),
            Self::NoFile => Some(UploadErrorCode::NoFile),
            Self::MissingTempDir => Some(UploadErrorCode::MissingTempDir),
            Self::WriteFailure => Some(UploadErrorCode::WriteFailure),
            Self::BlockedByHost => Some(UploadErrorCode::BlockedByHost),
        }
    }
}
impl TryFrom<u8> for TransportStatus {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Ok,
            1 => Self::ServerSizeExceeded,
            2 => Self::FormSizeExceeded,
            3 => Self::Partial,
            4 => Self::NoFile,
            6 => Self::MissingTempDir,
            7 => Self::WriteFailure,
            8 => Self::BlockedByHost,
            other => return Err(other),
        })
    }
}
