//! Validate, name and place uploaded files.
//!
//! An [`UploadSession`] takes the files an upload transport staged (or one
//! file fetched from a URL), runs each through the validator chain, assigns
//! it a destination name, and moves it under the configured root. Each file
//! ends up with a [`FileRecord`] saying what happened to it.

mod code;
pub mod error;
mod fetch;
mod file;
mod hooks;
mod name;
mod pipeline;
mod session;
mod translit;
mod validate;

pub use crate::code::{TransportStatus, UploadErrorCode};
pub use crate::fetch::{FALLBACK_NAME, FETCHED_MIME_TYPE, Fetcher, file_name_from_url};
pub use crate::file::{FileDescriptor, FileRecord, Status, TransportFile, split_name};
pub use crate::hooks::{NoopHooks, SessionView, UploadHooks};
pub use crate::name::{NAME_TRY_COUNT, NameFormatter, NameStrategy, destination_path};
pub use crate::pipeline::{Batch, UploadPipeline};
pub use crate::session::{UploadInput, UploadRequest, UploadSession};
pub use crate::translit::transliterate;
pub use crate::validate::{Validator, ValidatorChain, Verdict};
