//! Remote files.
//!
//! Fetching itself is left to the caller (any HTTP client will do); this
//! module only turns a URL into a safe file name.

use regex::Regex;
use std::io;
use std::sync::LazyLock;

/// Name used when a URL has nothing usable in its path.
pub const FALLBACK_NAME: &str = "noname";
/// Declared type of every fetched file; remote headers are not trusted.
pub const FETCHED_MIME_TYPE: &str = "application/octet-stream";

/// Anything that may not appear in a file name derived from a URL.
static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.\-]").unwrap());

/// Retrieves the bytes behind a URL.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> io::Result<Vec<u8>>;
}
impl<F> Fetcher for F
where
    F: Fn(&str) -> io::Result<Vec<u8>>,
{
    fn fetch(&self, url: &str) -> io::Result<Vec<u8>> {
        self(url)
    }
}

/// File name for the resource at `url`.
///
/// The query string and fragment are dropped, the last path segment is
/// percent-decoded, and everything but ASCII letters, digits, `_`, `.` and
/// `-` is removed.
///
/// ```
/// use stow_upload::file_name_from_url;
/// assert_eq!(file_name_from_url("https://cdn.example.com/a/My%20Photo.png?w=200#top"), "MyPhoto.png");
/// assert_eq!(file_name_from_url("https://example.com/"), "example.com");
/// assert_eq!(file_name_from_url("https://example.com/%D0%AF"), "noname");
/// ```
pub fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    let decoded = urlencoding::decode(segment).map(|s| s.into_owned()).unwrap_or_else(|_| segment.to_string());
    let sanitized = DISALLOWED.replace_all(&decoded, "");
    // Nothing left, or only dots ("." and ".." are not file names).
    match sanitized.chars().all(|c| c == '.') {
        true => FALLBACK_NAME.to_string(),
        false => sanitized.into_owned(),
    }
}
