//! Validator specifications.
//!
//! A spec is plain data describing one check; the upload crate turns each
//! into a runnable validator. Specs are evaluated in the order they are
//! configured.
//!
//! ```toml
//! [[validators]]
//! kind = "extension"
//! data = ["jpg", "png"]
//!
//! [[validators]]
//! kind = "size"
//! data = "2M"
//!
//! [[validators]]
//! kind = "mime"
//! data = "image/png"
//! ```

use crate::size::SizeLimit;
use serde::{Deserialize, Serialize};

/// A set of allowed values, configured as either one string or a list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany", into = "Vec<String>")]
pub struct AllowList(Vec<String>);
impl AllowList {
    pub fn new<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Self(values.into_iter().map(Into::into).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Exact (case-sensitive) membership.
    pub fn contains(&self, value: &str) -> bool {
        self.iter().any(|allowed| allowed == value)
    }

    /// ASCII case-insensitive membership.
    pub fn contains_ignore_case(&self, value: &str) -> bool {
        self.iter().any(|allowed| allowed.eq_ignore_ascii_case(value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
impl From<AllowList> for Vec<String> {
    fn from(list: AllowList) -> Self {
        list.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}
impl From<OneOrMany> for AllowList {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(one) => Self(vec![one]),
            OneOrMany::Many(many) => Self(many),
        }
    }
}

/// One configured check, run against every file of a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum ValidatorSpec {
    /// Declared MIME type must be one of these, exactly.
    Mime(AllowList),
    /// File size must not exceed this limit.
    Size(SizeLimit),
    /// Extension must be one of these, ignoring case.
    Extension(AllowList),
}
impl ValidatorSpec {
    pub fn mime<S: Into<String>>(allowed: impl IntoIterator<Item = S>) -> Self {
        Self::Mime(AllowList::new(allowed))
    }

    pub fn size(limit: impl Into<SizeLimit>) -> Self {
        Self::Size(limit.into())
    }

    pub fn extension<S: Into<String>>(allowed: impl IntoIterator<Item = S>) -> Self {
        Self::Extension(AllowList::new(allowed))
    }
}
