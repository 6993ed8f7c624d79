//! The upload session: configuration plus the results of the last batch.

use crate::code::{TransportStatus, UploadErrorCode};
use crate::error::{ErrorKind, Result};
use crate::fetch::{FETCHED_MIME_TYPE, Fetcher, file_name_from_url};
use crate::file::{FileDescriptor, FileRecord, TransportFile};
use crate::hooks::{NoopHooks, UploadHooks};
use crate::name::NameFormatter;
use crate::pipeline::UploadPipeline;
use exn::{OptionExt, ResultExt};
use std::collections::HashMap;
use std::path::MAIN_SEPARATOR;
use std::sync::Arc;
use stow_config::UploadConfig;
use stow_storage::backend::LocalBackend;
use stow_storage::{BackendHandle, StagedFile};
use tracing::instrument;

/// What the transport staged under one form field.
#[derive(Clone, Debug)]
pub enum UploadInput {
    Single(TransportFile),
    Multiple(Vec<TransportFile>),
}
impl UploadInput {
    pub fn files(&self) -> &[TransportFile] {
        match self {
            Self::Single(file) => std::slice::from_ref(file),
            Self::Multiple(files) => files,
        }
    }
}

/// Staged files of one request, by form field.
#[derive(Clone, Debug, Default)]
pub struct UploadRequest {
    fields: HashMap<String, UploadInput>,
}
impl UploadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, key: impl Into<String>, file: TransportFile) -> Self {
        self.fields.insert(key.into(), UploadInput::Single(file));
        self
    }

    pub fn with_files(mut self, key: impl Into<String>, files: impl IntoIterator<Item = TransportFile>) -> Self {
        self.fields.insert(key.into(), UploadInput::Multiple(files.into_iter().collect()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&UploadInput> {
        self.fields.get(key)
    }
}

/// Drives uploads into one destination.
///
/// A session can be reused: every upload starts by forgetting the previous
/// batch, and the configuration may be swapped between batches.
///
/// ```no_run
/// use stow_config::{UploadConfig, ValidatorSpec};
/// use stow_upload::{TransportFile, UploadRequest, UploadSession};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = UploadConfig::builder()
///     .destination("/srv/uploads")
///     .shard_depth(2)
///     .validator(ValidatorSpec::extension(["jpg", "png"]))
///     .validator(ValidatorSpec::size("2M"))
///     .build()?;
/// let mut session = UploadSession::new(config)?;
/// let request = UploadRequest::new().with_file(
///     "avatar",
///     TransportFile::new("me.png", "/tmp/php4kYj2").with_mime_type("image/png").with_size(5120),
/// );
/// for file in session.upload(&request, "avatar")? {
///     println!("{} -> {:?} ({})", file.full_name, file.full_path, file.error_code);
/// }
/// # Ok(())
/// # }
/// ```
pub struct UploadSession {
    config: UploadConfig,
    backend: BackendHandle,
    custom_backend: bool,
    hooks: Box<dyn UploadHooks>,
    formatter: Option<Box<dyn NameFormatter>>,
    files: Vec<FileRecord>,
    error_code: UploadErrorCode,
}
impl UploadSession {
    /// Session storing into the local directory named by the configuration.
    pub fn new(config: UploadConfig) -> Result<Self> {
        let backend = Self::local_backend(&config)?;
        Ok(Self {
            config,
            backend,
            custom_backend: false,
            hooks: Box::new(NoopHooks),
            formatter: None,
            files: Vec::new(),
            error_code: UploadErrorCode::NoError,
        })
    }

    fn local_backend(config: &UploadConfig) -> Result<BackendHandle> {
        let backend = LocalBackend::new("local", config.destination()).or_raise(|| ErrorKind::Storage)?;
        Ok(Arc::new(backend))
    }

    /// Store through `backend` instead; it stays in place across reconfiguration.
    pub fn with_backend(mut self, backend: BackendHandle) -> Self {
        self.backend = backend;
        self.custom_backend = true;
        self
    }

    pub fn with_hooks(mut self, hooks: impl UploadHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn with_formatter(mut self, formatter: impl NameFormatter + 'static) -> Self {
        self.formatter = Some(Box::new(formatter));
        self
    }

    /// Swap the configuration for the following batches.
    pub fn reconfigure(&mut self, config: UploadConfig) -> Result<()> {
        if !self.custom_backend && config.destination() != self.config.destination() {
            self.backend = Self::local_backend(&config)?;
        }
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Destination root, with native separators and exactly one trailing separator.
    pub fn destination(&self) -> String {
        let raw = self.config.destination().to_string_lossy();
        let trimmed = raw.trim_end_matches(['/', '\\']);
        let mut destination: String = trimmed.chars().map(|c| if c == '/' || c == '\\' { MAIN_SEPARATOR } else { c }).collect();
        destination.push(MAIN_SEPARATOR);
        destination
    }

    /// Results of the last batch, in input order.
    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn first_file(&self) -> Option<&FileRecord> {
        self.files.first()
    }

    /// Most recent failure of the last batch.
    pub fn error_code(&self) -> UploadErrorCode {
        self.error_code
    }

    pub fn error_message(&self) -> &'static str {
        self.error_code.message()
    }

    /// Forget the last batch.
    pub fn reset(&mut self) {
        self.files.clear();
        self.error_code = UploadErrorCode::NoError;
    }

    /// Process the files the transport staged under `key`.
    ///
    /// # Errors
    ///
    /// Fails without touching anything when `key` is not in the request.
    /// Otherwise fails when the batch had to stop early (disallowed
    /// extension, destination directory not creatable); the files processed
    /// until then are still available from [`files`](Self::files).
    #[instrument(skip_all, fields(key = %key))]
    pub fn upload(&mut self, request: &UploadRequest, key: &str) -> Result<&[FileRecord]> {
        self.reset();
        let input = request.get(key).ok_or_raise(|| ErrorKind::MissingInput(key.to_string()))?;
        let staging_dir = self.config.staging_dir();
        let files = input
            .files()
            .iter()
            .cloned()
            .map(|file| FileDescriptor::from_transport(file, staging_dir))
            .collect();
        self.run(files)
    }

    /// Fetch `url` and process it as a single uploaded file.
    #[instrument(skip_all, fields(url = %url))]
    pub fn upload_by_url(&mut self, url: &str, fetcher: &dyn Fetcher) -> Result<&[FileRecord]> {
        self.reset();
        let file = self.fetch(url, fetcher);
        self.run(vec![file])
    }

    fn fetch(&self, url: &str, fetcher: &dyn Fetcher) -> FileDescriptor {
        let name = file_name_from_url(url);
        let reservation = match StagedFile::reserve(self.config.staging_dir()) {
            Ok(reservation) => reservation,
            Err(err) => {
                tracing::warn!(error = ?err, "Could not reserve a temp file for download");
                return FileDescriptor::new(name, FETCHED_MIME_TYPE, 0, None, TransportStatus::MissingTempDir);
            },
        };
        let bytes = match fetcher.fetch(url) {
            Ok(bytes) if !bytes.is_empty() => bytes,
            result => {
                if let Err(err) = result {
                    tracing::warn!(error = %err, "Could not fetch remote file");
                } else {
                    tracing::warn!("Remote file is empty");
                }
                let mut file = FileDescriptor::new(name, FETCHED_MIME_TYPE, 0, None, TransportStatus::Ok);
                file.fail(UploadErrorCode::CannotGetRemoteFile);
                return file;
            },
        };
        let size = bytes.len() as u64;
        match reservation.write(&bytes) {
            Ok(staged) => FileDescriptor::new(name, FETCHED_MIME_TYPE, size, Some(staged), TransportStatus::Ok),
            Err(err) => {
                tracing::warn!(error = ?err, "Could not write downloaded file");
                FileDescriptor::new(name, FETCHED_MIME_TYPE, size, None, TransportStatus::WriteFailure)
            },
        }
    }

    fn run(&mut self, files: Vec<FileDescriptor>) -> Result<&[FileRecord]> {
        let batch = UploadPipeline::new(&self.config, self.backend.as_ref(), self.hooks.as_ref())
            .with_formatter(self.formatter.as_deref())
            .run(files);
        self.files = batch.records;
        self.error_code = batch.error_code;
        match batch.aborted {
            Some(err) => Err(err),
            None => Ok(&self.files),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::Status;
    use crate::hooks::SessionView;
    use rstest::rstest;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use stow_config::{NameFormat, ValidatorSpec};
    use stow_storage::backend::MockBackend;
    use tempfile::TempDir;

    struct Fixture {
        staging: TempDir,
        uploads: TempDir,
    }
    impl Fixture {
        fn new() -> Self {
            Self {
                staging: tempfile::tempdir().unwrap(),
                uploads: tempfile::tempdir().unwrap(),
            }
        }

        fn config(&self) -> stow_config::UploadConfigBuilder {
            UploadConfig::builder()
                .destination(self.uploads.path())
                .staging_dir(self.staging.path().to_path_buf())
        }

        /// Write `data` to a fresh transport temp file.
        fn stage(&self, name: &str, mime: &str, data: &[u8]) -> TransportFile {
            let (_, tmp) = tempfile::Builder::new().prefix("php").tempfile_in(self.staging.path()).unwrap().keep().unwrap();
            fs::write(&tmp, data).unwrap();
            TransportFile::new(name, tmp).with_mime_type(mime).with_size(data.len() as u64)
        }

        fn stored(&self) -> Vec<PathBuf> {
            let mut stored = Vec::new();
            let mut pending = vec![self.uploads.path().to_path_buf()];
            while let Some(dir) = pending.pop() {
                for entry in fs::read_dir(dir).unwrap() {
                    let path = entry.unwrap().path();
                    if path.is_dir() { pending.push(path) } else { stored.push(path) }
                }
            }
            stored
        }
    }

    #[test]
    fn test_mixed_batch() {
        let fixture = Fixture::new();
        let config = fixture
            .config()
            .validator(ValidatorSpec::size("1M"))
            .validator(ValidatorSpec::extension(["png"]))
            .build()
            .unwrap();
        let mut session = UploadSession::new(config).unwrap();
        let big = vec![0u8; 1024 * 1024 + 1];
        let request = UploadRequest::new().with_files(
            "photos",
            [
                TransportFile::new("missing.png", "").with_status(TransportStatus::NoFile),
                fixture.stage("huge.png", "image/png", &big),
                fixture.stage("photo.png", "image/png", b"\x89PNG"),
            ],
        );

        let records = session.upload(&request, "photos").unwrap();
        let outcome: Vec<_> = records.iter().map(|r| (r.status, r.error_code)).collect();
        assert_eq!(
            outcome,
            vec![
                (Status::Failed, UploadErrorCode::NoFile),
                (Status::Failed, UploadErrorCode::FileTooLarge),
                (Status::Moved, UploadErrorCode::NoError),
            ]
        );
        let stored = fixture.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(records[2].full_path.as_deref(), Some(fs::canonicalize(&stored[0]).unwrap().as_path()));
        assert!(stored[0].file_name().unwrap().to_string_lossy().starts_with("photo_"));
        assert_eq!(session.error_code(), UploadErrorCode::FileTooLarge);
        assert_eq!(session.error_message(), "Validator: file too large");
        // Every temp file is gone, moved or not.
        assert_eq!(fs::read_dir(fixture.staging.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_batches_are_independent() {
        let fixture = Fixture::new();
        let config = fixture.config().validator(ValidatorSpec::mime(["image/png"])).build().unwrap();
        let mut session = UploadSession::new(config).unwrap();

        let first = UploadRequest::new().with_file("file", fixture.stage("notes.txt", "text/plain", b"hi"));
        assert_eq!(session.upload(&first, "file").unwrap().len(), 1);
        assert_eq!(session.error_code(), UploadErrorCode::InvalidMimeType);

        let second = UploadRequest::new().with_files(
            "file",
            [
                fixture.stage("a.png", "image/png", b"a"),
                fixture.stage("bb.png", "image/png", b"bb"),
            ],
        );
        let records = session.upload(&second, "file").unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(FileRecord::is_moved));
        assert_eq!(session.error_code(), UploadErrorCode::NoError);
        assert_eq!(session.first_file().unwrap().full_name, "a.png");
    }

    #[test]
    fn test_missing_key() {
        let fixture = Fixture::new();
        let mut session = UploadSession::new(fixture.config().build().unwrap()).unwrap();
        let request = UploadRequest::new().with_file("avatar", fixture.stage("me.png", "image/png", b"png"));
        let err = session.upload(&request, "photo").unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingInput(key) if key == "photo"));
        assert!(session.files().is_empty());
        assert!(fixture.stored().is_empty());
    }

    #[rstest]
    #[case("photo.JPG", true)]
    #[case("photo.png", true)]
    #[case("photo.exe", false)]
    fn test_extension_allow_list(#[case] name: &str, #[case] accepted: bool) {
        let fixture = Fixture::new();
        let config = fixture.config().validator(ValidatorSpec::extension(["jpg", "png"])).build().unwrap();
        let mut session = UploadSession::new(config).unwrap();
        let request = UploadRequest::new().with_files(
            "file",
            [fixture.stage(name, "image/jpeg", b"data"), fixture.stage("after.png", "image/png", b"more data")],
        );
        match accepted {
            true => {
                let records = session.upload(&request, "file").unwrap();
                assert!(records.iter().all(FileRecord::is_moved));
            },
            false => {
                let err = session.upload(&request, "file").unwrap_err();
                assert!(matches!(&*err, ErrorKind::InvalidExtension(ext) if ext == "exe"));
                let statuses: Vec<_> = session.files().iter().map(|r| r.status).collect();
                assert_eq!(statuses, vec![Status::Failed, Status::Pending]);
                assert_eq!(session.error_code(), UploadErrorCode::InvalidExtension);
                assert!(fixture.stored().is_empty());
            },
        }
    }

    #[test]
    fn test_no_available_name() {
        let fixture = Fixture::new();
        let backend: BackendHandle = Arc::new(MockBackend::default().always_occupied());
        let mut session = UploadSession::new(fixture.config().build().unwrap()).unwrap().with_backend(backend);
        let request = UploadRequest::new().with_file("file", fixture.stage("photo.png", "image/png", b"png"));
        let records = session.upload(&request, "file").unwrap();
        assert_eq!(records[0].error_code, UploadErrorCode::NoAvailableName);
        assert_eq!(records[0].new_name, None);
    }

    #[test]
    fn test_destination_creation_failure_is_fatal() {
        let fixture = Fixture::new();
        let blocker = fixture.uploads.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let config = fixture.config().destination(blocker.join("uploads")).build().unwrap();
        let mut session = UploadSession::new(config).unwrap();
        let request = UploadRequest::new().with_file("file", fixture.stage("photo.png", "image/png", b"png"));
        let err = session.upload(&request, "file").unwrap_err();
        assert!(matches!(&*err, ErrorKind::CannotCreateDestination(_)));
        assert_eq!(session.error_code(), UploadErrorCode::CannotCreateDestination);
    }

    #[test]
    fn test_hooks_and_formatter() {
        struct Lowercase;
        impl UploadHooks for Lowercase {
            fn before_validate(&self, file: &mut FileDescriptor, _: &SessionView<'_>) {
                file.extension = file.extension.to_lowercase();
            }
        }
        let fixture = Fixture::new();
        let mut session = UploadSession::new(fixture.config().build().unwrap())
            .unwrap()
            .with_hooks(Lowercase)
            .with_formatter(|file: &FileDescriptor| Some(format!("avatar.{}", file.extension)));
        let request = UploadRequest::new().with_file("file", fixture.stage("Me.PNG", "image/png", b"png"));
        let records = session.upload(&request, "file").unwrap();
        assert_eq!(records[0].new_name.as_deref(), Some("avatar.png"));
        assert!(fixture.uploads.path().join("avatar.png").exists());
    }

    #[test]
    fn test_original_names_collide_in_one_batch() {
        let fixture = Fixture::new();
        let config = fixture.config().name_format(NameFormat::Original).build().unwrap();
        let mut session = UploadSession::new(config).unwrap();
        let request = UploadRequest::new().with_files(
            "file",
            [fixture.stage("photo.png", "image/png", b"one"), fixture.stage("photo.png", "image/png", b"second")],
        );
        let records = session.upload(&request, "file").unwrap();
        assert!(records[0].is_moved());
        assert_eq!(records[1].error_code, UploadErrorCode::FilenameExists);
        assert_eq!(fs::read(fixture.uploads.path().join("photo.png")).unwrap(), b"one");
    }

    #[test]
    fn test_untrusted_temp_path() {
        let fixture = Fixture::new();
        let elsewhere = tempfile::tempdir().unwrap();
        let secret = elsewhere.path().join("secret");
        fs::write(&secret, b"secret").unwrap();
        let mut session = UploadSession::new(fixture.config().build().unwrap()).unwrap();
        let request = UploadRequest::new().with_file("file", TransportFile::new("photo.png", &secret).with_size(6));
        let records = session.upload(&request, "file").unwrap();
        assert_eq!(records[0].error_code, UploadErrorCode::CannotMoveFile);
        assert!(secret.exists());
        assert!(fixture.stored().is_empty());
    }

    #[test]
    fn test_default_staging_dir_protects_other_files() {
        let uploads = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::Builder::new().prefix(".stow").tempdir_in(env!("CARGO_MANIFEST_DIR")).unwrap();
        let temp_root = fs::canonicalize(std::env::temp_dir()).unwrap();
        if fs::canonicalize(elsewhere.path()).unwrap().starts_with(temp_root) {
            return;
        }
        let precious = elsewhere.path().join("precious.db");
        fs::write(&precious, b"data").unwrap();
        let config = UploadConfig::builder()
            .destination(uploads.path())
            .validator(ValidatorSpec::mime(["image/png"]))
            .build()
            .unwrap();
        let mut session = UploadSession::new(config).unwrap();
        let request = UploadRequest::new().with_file("file", TransportFile::new("precious.db", &precious).with_size(4));
        let records = session.upload(&request, "file").unwrap();
        assert_eq!(records[0].error_code, UploadErrorCode::InvalidMimeType);
        assert!(precious.exists());
    }

    #[test]
    fn test_upload_by_url() {
        let fixture = Fixture::new();
        let config = fixture.config().name_format(NameFormat::Original).file_mode(0o600).build().unwrap();
        let mut session = UploadSession::new(config).unwrap();
        let fetcher = |_: &str| -> io::Result<Vec<u8>> { Ok(b"remote".to_vec()) };
        let records = session.upload_by_url("https://example.com/files/Report%202024.pdf?dl=1", &fetcher).unwrap();
        let record = &records[0];
        assert!(record.is_moved());
        assert_eq!(record.full_name, "Report2024.pdf");
        assert_eq!(record.name, "Report2024");
        assert_eq!(record.extension, "pdf");
        assert_eq!(record.mime_type, FETCHED_MIME_TYPE);
        assert_eq!(record.size, 6);
        assert_eq!(fs::read(fixture.uploads.path().join("Report2024.pdf")).unwrap(), b"remote");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(fixture.uploads.path().join("Report2024.pdf")).unwrap().permissions().mode();
            assert_eq!(mode & 0o7777, 0o600);
        }
        assert_eq!(fs::read_dir(fixture.staging.path()).unwrap().count(), 0);
    }

    #[rstest]
    #[case(Ok(Vec::new()))]
    #[case(Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")))]
    fn test_upload_by_url_fetch_failure(#[case] result: io::Result<Vec<u8>>) {
        let fixture = Fixture::new();
        let mut session = UploadSession::new(fixture.config().build().unwrap()).unwrap();
        let result = std::cell::RefCell::new(Some(result));
        let fetcher = |_: &str| result.borrow_mut().take().unwrap();
        let records = session.upload_by_url("https://example.com/photo.png", &fetcher).unwrap();
        assert_eq!(records[0].error_code, UploadErrorCode::CannotGetRemoteFile);
        assert_eq!(session.error_code(), UploadErrorCode::CannotGetRemoteFile);
        assert!(fixture.stored().is_empty());
        assert_eq!(fs::read_dir(fixture.staging.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_upload_by_url_without_temp_dir() {
        let fixture = Fixture::new();
        let config = fixture.config().staging_dir(fixture.staging.path().join("missing")).build().unwrap();
        let mut session = UploadSession::new(config).unwrap();
        let fetcher = |_: &str| -> io::Result<Vec<u8>> { Ok(b"remote".to_vec()) };
        let records = session.upload_by_url("https://example.com/photo.png", &fetcher).unwrap();
        assert_eq!(records[0].error_code, UploadErrorCode::MissingTempDir);
    }

    #[test]
    fn test_upload_by_url_is_still_validated() {
        let fixture = Fixture::new();
        let config = fixture.config().validator(ValidatorSpec::size(4u64)).build().unwrap();
        let mut session = UploadSession::new(config).unwrap();
        let fetcher = |_: &str| -> io::Result<Vec<u8>> { Ok(b"too long".to_vec()) };
        let records = session.upload_by_url("https://example.com/photo.png", &fetcher).unwrap();
        assert_eq!(records[0].error_code, UploadErrorCode::FileTooLarge);
    }

    #[test]
    fn test_reconfigure_moves_destination() {
        let fixture = Fixture::new();
        let mut session = UploadSession::new(fixture.config().build().unwrap()).unwrap();
        let other = fixture.uploads.path().join("other");
        session.reconfigure(fixture.config().destination(&other).name_format(NameFormat::Original).build().unwrap()).unwrap();
        let request = UploadRequest::new().with_file("file", fixture.stage("photo.png", "image/png", b"png"));
        session.upload(&request, "file").unwrap();
        assert!(other.join("photo.png").exists());
    }

    #[rstest]
    #[case("./", "./")]
    #[case("/srv/uploads", "/srv/uploads/")]
    #[case("/srv/uploads///", "/srv/uploads/")]
    #[case("uploads\\images\\", "uploads/images/")]
    #[case("/", "/")]
    fn test_destination_normalized(#[case] destination: &str, #[case] expected: &str) {
        let config = UploadConfig::builder().destination(destination).build().unwrap();
        let backend: BackendHandle = Arc::new(MockBackend::default());
        let session = UploadSession::new(config).unwrap().with_backend(backend);
        assert_eq!(session.destination(), expected.replace('/', &MAIN_SEPARATOR.to_string()));
    }
}
