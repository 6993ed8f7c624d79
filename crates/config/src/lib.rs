//! Upload configuration.
//!
//! An [`UploadConfig`] is an immutable value: build one with
//! [`UploadConfig::builder`], or [`load`](UploadConfig::load) one from a
//! file layered under `STOW_`-prefixed environment variables. It is
//! validated once on construction and then shared read-only by every file
//! of a batch.

pub mod error;
mod size;
mod validator;

pub use crate::size::{SizeLimit, human_readable_to_bytes};
pub use crate::validator::{AllowList, ValidatorSpec};
use crate::error::{ErrorKind, Result};
use derive_more::Display;
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for environment variable overrides (`STOW_OVERWRITE=true`).
pub const ENV_PREFIX: &str = "STOW_";
/// File name of the configuration inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "upload.toml";
/// Permission bits applied to placed files unless configured otherwise.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// How a stored file gets its name.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameFormat {
    /// Keep the client supplied name.
    #[display("original")]
    Original,
    /// A generated unique token plus the extension.
    #[display("randomized")]
    Randomized,
    /// The (transliterated) base name, then a unique token, then the extension.
    #[default]
    #[display("combined")]
    Combined,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    destination: PathBuf,
    overwrite: bool,
    name_format: NameFormat,
    transliterate: bool,
    shard_depth: usize,
    file_mode: u32,
    staging_dir: Option<PathBuf>,
    fail_fast: bool,
    validators: Vec<ValidatorSpec>,
}
impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            destination: PathBuf::from("./"),
            overwrite: false,
            name_format: NameFormat::default(),
            transliterate: true,
            shard_depth: 0,
            file_mode: DEFAULT_FILE_MODE,
            staging_dir: Some(std::env::temp_dir()),
            fail_fast: false,
            validators: Vec::new(),
        }
    }
}
impl UploadConfig {
    pub fn builder() -> UploadConfigBuilder {
        UploadConfigBuilder { config: Self::default() }
    }

    /// Start a builder from this configuration, for reconfiguring between batches.
    pub fn to_builder(&self) -> UploadConfigBuilder {
        UploadConfigBuilder { config: self.clone() }
    }

    /// Load configuration from `path`, then apply `STOW_*` environment overrides.
    ///
    /// The file format follows the extension (`.yaml`/`.yml`, `.json`,
    /// anything else is TOML). A missing file is not an error: defaults and
    /// the environment still apply.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let figment = Figment::from(Serialized::defaults(Self::default()));
        let figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
            Some("json") => figment.merge(Json::file(path)),
            _ => figment.merge(Toml::file(path)),
        };
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .or_raise(|| ErrorKind::Load(path.to_path_buf()))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), destination = %config.destination.display(), "Loaded upload configuration");
        Ok(config)
    }

    /// Platform specific location of `upload.toml`.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "stow").ok_or_raise(|| ErrorKind::NoConfigDirectory)?;
        Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    fn validate(&self) -> Result<()> {
        if self.destination.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("destination must not be empty".to_string()));
        }
        if self.shard_depth > stow_storage::shard::MAX_DEPTH {
            exn::bail!(ErrorKind::Invalid(format!(
                "shard depth {} exceeds the maximum of {}",
                self.shard_depth,
                stow_storage::shard::MAX_DEPTH
            )));
        }
        if self.file_mode > 0o7777 {
            exn::bail!(ErrorKind::Invalid(format!("file mode {:o} is not a permission mode", self.file_mode)));
        }
        Ok(())
    }

    /// Root directory uploads are placed under.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Whether an existing file at the destination may be replaced.
    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn name_format(&self) -> NameFormat {
        self.name_format
    }

    /// Whether Cyrillic base names are transliterated in combined names.
    pub fn transliterate(&self) -> bool {
        self.transliterate
    }

    /// Number of nested hash directories (`0` is flat).
    pub fn shard_depth(&self) -> usize {
        self.shard_depth
    }

    pub fn file_mode(&self) -> u32 {
        self.file_mode
    }

    /// Directory that transport temp files must live in to be adopted.
    ///
    /// Defaults to the system temp directory. `None` adopts any regular file.
    pub fn staging_dir(&self) -> Option<&Path> {
        self.staging_dir.as_deref()
    }

    /// Stop checking a file at its first failed validator.
    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    pub fn validators(&self) -> &[ValidatorSpec] {
        &self.validators
    }
}

/// Fluent builder for [`UploadConfig`].
#[derive(Clone, Debug)]
pub struct UploadConfigBuilder {
    config: UploadConfig,
}
impl UploadConfigBuilder {
    pub fn destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.config.destination = destination.into();
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.config.overwrite = overwrite;
        self
    }

    pub fn name_format(mut self, name_format: NameFormat) -> Self {
        self.config.name_format = name_format;
        self
    }

    pub fn transliterate(mut self, transliterate: bool) -> Self {
        self.config.transliterate = transliterate;
        self
    }

    pub fn shard_depth(mut self, depth: usize) -> Self {
        self.config.shard_depth = depth;
        self
    }

    pub fn file_mode(mut self, mode: u32) -> Self {
        self.config.file_mode = mode;
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<Option<PathBuf>>) -> Self {
        self.config.staging_dir = dir.into();
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.config.fail_fast = fail_fast;
        self
    }

    /// Append one validator to the end of the chain.
    pub fn validator(mut self, spec: ValidatorSpec) -> Self {
        self.config.validators.push(spec);
        self
    }

    /// Replace the whole validator chain.
    pub fn validators(mut self, specs: impl IntoIterator<Item = ValidatorSpec>) -> Self {
        self.config.validators = specs.into_iter().collect();
        self
    }

    pub fn build(self) -> Result<UploadConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = UploadConfig::default();
        assert_eq!(config.destination(), Path::new("./"));
        assert!(!config.overwrite());
        assert_eq!(config.name_format(), NameFormat::Combined);
        assert!(config.transliterate());
        assert_eq!(config.shard_depth(), 0);
        assert_eq!(config.file_mode(), 0o644);
        assert_eq!(config.staging_dir(), Some(std::env::temp_dir().as_path()));
        assert!(!config.fail_fast());
        assert!(config.validators().is_empty());
    }

    #[test]
    fn test_builder() {
        let config = UploadConfig::builder()
            .destination("/srv/uploads")
            .overwrite(true)
            .name_format(NameFormat::Original)
            .shard_depth(2)
            .file_mode(0o600)
            .validator(ValidatorSpec::extension(["png"]))
            .validator(ValidatorSpec::size("1M"))
            .build()
            .unwrap();
        assert_eq!(config.destination(), Path::new("/srv/uploads"));
        assert!(config.overwrite());
        assert_eq!(config.shard_depth(), 2);
        assert_eq!(config.validators().len(), 2);
        assert_eq!(config.validators()[0], ValidatorSpec::extension(["png"]));
    }

    #[test]
    fn test_to_builder_keeps_original_untouched() {
        let original = UploadConfig::builder().shard_depth(1).build().unwrap();
        let changed = original.to_builder().shard_depth(3).build().unwrap();
        assert_eq!(original.shard_depth(), 1);
        assert_eq!(changed.shard_depth(), 3);
    }

    #[rstest]
    #[case(UploadConfig::builder().destination(""))]
    #[case(UploadConfig::builder().shard_depth(stow_storage::shard::MAX_DEPTH + 1))]
    #[case(UploadConfig::builder().file_mode(0o10000))]
    fn test_build_rejects_invalid(#[case] builder: UploadConfigBuilder) {
        let err = builder.build().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_name_format_display() {
        assert_eq!(NameFormat::Randomized.to_string(), "randomized");
    }

    #[test]
    fn test_load_toml_with_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "upload.toml",
                r#"
                    destination = "/srv/uploads"
                    name_format = "randomized"
                    shard_depth = 2
                    file_mode = 0o640

                    [[validators]]
                    kind = "extension"
                    data = ["jpg", "png"]

                    [[validators]]
                    kind = "size"
                    data = "2M"
                "#,
            )?;
            jail.set_env("STOW_OVERWRITE", "true");
            jail.set_env("STOW_SHARD_DEPTH", "3");
            let config = UploadConfig::load("upload.toml").unwrap();
            assert_eq!(config.destination(), Path::new("/srv/uploads"));
            assert_eq!(config.name_format(), NameFormat::Randomized);
            assert!(config.overwrite());
            assert_eq!(config.shard_depth(), 3);
            assert_eq!(config.file_mode(), 0o640);
            assert_eq!(
                config.validators(),
                &[ValidatorSpec::extension(["jpg", "png"]), ValidatorSpec::size("2M")]
            );
            // Untouched values keep their defaults
            assert!(config.transliterate());
            Ok(())
        });
    }

    #[test]
    fn test_load_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "upload.yaml",
                "destination: uploads/\ntransliterate: false\nvalidators:\n  - kind: mime\n    data: image/png\n",
            )?;
            let config = UploadConfig::load("upload.yaml").unwrap();
            assert_eq!(config.destination(), Path::new("uploads/"));
            assert!(!config.transliterate());
            assert_eq!(config.validators(), &[ValidatorSpec::mime(["image/png"])]);
            Ok(())
        });
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            assert_eq!(UploadConfig::load("missing.toml").unwrap(), UploadConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        Jail::expect_with(|jail| {
            jail.create_file("upload.json", r#"{"shard_depth": 99}"#)?;
            let err = UploadConfig::load("upload.json").unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            jail.create_file("broken.toml", "shard_depth = \"deep\"")?;
            let err = UploadConfig::load("broken.toml").unwrap_err();
            assert!(matches!(&*err, ErrorKind::Load(_)));
            Ok(())
        });
    }

    #[test]
    fn test_default_path() {
        if let Ok(path) = UploadConfig::default_path() {
            assert!(path.ends_with(CONFIG_FILE_NAME));
        }
    }
}
