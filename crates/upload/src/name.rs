//! Assigning destination file names.
//!
//! A caller supplied [`NameFormatter`] always wins. Otherwise the configured
//! [`NameFormat`] decides: keep the original name, or generate a unique one
//! (optionally prefixed by the file's base name) and probe the destination
//! until a free name turns up.
//!
//! Probing is best effort. Nothing is reserved, so two sessions can still
//! pick the same name between the probe and the move.

use crate::code::UploadErrorCode;
use crate::file::FileDescriptor;
use crate::translit::transliterate;
use std::path::PathBuf;
use stow_config::{NameFormat, UploadConfig};
use stow_storage::{StorageBackend, shard, validate_file_name};

/// Maximum number of generated candidates probed before giving up.
pub const NAME_TRY_COUNT: usize = 10;

/// Caller supplied naming. Returning `None` or an empty string is an error
/// for that file.
pub trait NameFormatter: Send + Sync {
    fn format(&self, file: &FileDescriptor) -> Option<String>;
}
impl<F> NameFormatter for F
where
    F: Fn(&FileDescriptor) -> Option<String> + Send + Sync,
{
    fn format(&self, file: &FileDescriptor) -> Option<String> {
        self(file)
    }
}

/// Path of `name` relative to the destination root, sharded when configured.
pub fn destination_path(name: &str, shard_depth: usize) -> PathBuf {
    shard::directory(name, shard_depth).join(name)
}

/// A hard-to-repeat token: seconds and microseconds of the current time,
/// then 32 random bits.
fn unique_token() -> String {
    let now = time::UtcDateTime::now();
    let entropy = uuid::Uuid::new_v4().simple().to_string();
    format!("{:08x}{:05x}{}", now.unix_timestamp(), now.microsecond(), &entropy[..8])
}

pub struct NameStrategy<'a> {
    config: &'a UploadConfig,
    formatter: Option<&'a dyn NameFormatter>,
    backend: &'a dyn StorageBackend,
}
impl<'a> NameStrategy<'a> {
    pub fn new(config: &'a UploadConfig, formatter: Option<&'a dyn NameFormatter>, backend: &'a dyn StorageBackend) -> Self {
        Self { config, formatter, backend }
    }

    /// Pick the destination name for `file`.
    ///
    /// Every name that comes out of here is a single plain path component;
    /// anything else fails with [`InvalidFileName`](UploadErrorCode::InvalidFileName).
    pub fn resolve(&self, file: &FileDescriptor) -> Result<String, UploadErrorCode> {
        if let Some(formatter) = self.formatter {
            let name = formatter
                .format(file)
                .filter(|name| !name.is_empty())
                .ok_or(UploadErrorCode::InvalidFormatterResult)?;
            return Self::checked(name);
        }
        match self.config.name_format() {
            NameFormat::Original => Self::checked(file.original_name.clone()),
            NameFormat::Randomized => self.generate(file, ""),
            NameFormat::Combined => {
                let base = match self.config.transliterate() {
                    true => transliterate(&file.base_name),
                    false => file.base_name.clone(),
                };
                self.generate(file, &format!("{base}_"))
            },
        }
    }

    fn checked(name: String) -> Result<String, UploadErrorCode> {
        match validate_file_name(&name) {
            Ok(_) => Ok(name),
            Err(_) => {
                tracing::warn!(name = %name, "Refusing file name that is not a single path component");
                Err(UploadErrorCode::InvalidFileName)
            },
        }
    }

    fn generate(&self, file: &FileDescriptor, prefix: &str) -> Result<String, UploadErrorCode> {
        let suffix = match file.extension.is_empty() {
            true => String::new(),
            false => format!(".{}", file.extension),
        };
        for attempt in 1..=NAME_TRY_COUNT {
            let candidate = Self::checked(format!("{prefix}{}{suffix}", unique_token()))?;
            let path = destination_path(&candidate, self.config.shard_depth());
            match self.backend.exists(&path) {
                Ok(false) => return Ok(candidate),
                Ok(true) => tracing::debug!(attempt, candidate = %candidate, "Generated name already taken"),
                // Can't tell, so don't take the chance.
                Err(e) => tracing::debug!(attempt, candidate = %candidate, error = ?e, "Could not probe generated name"),
            }
        }
        tracing::warn!(file = %file.original_name, tries = NAME_TRY_COUNT, "No available name for file");
        Err(UploadErrorCode::NoAvailableName)
    }
}
