//! Size limits, either a plain byte count or a human readable magnitude.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Multiplier for the unit suffix of a human readable size.
fn unit(suffix: char) -> Option<u64> {
    match suffix.to_ascii_lowercase() {
        'b' => Some(1),
        'k' => Some(1024),
        'm' => Some(1024 * 1024),
        'g' => Some(1024 * 1024 * 1024),
        _ => None,
    }
}

/// Convert a human readable size (`"200K"`, `"1M"`, `"2g"`) into bytes.
///
/// Plain numbers (including decimals) are truncated to an integer. Anything
/// else is its leading integer multiplied by the unit of its last character;
/// an unrecognised unit leaves the leading integer as is. Negative and
/// unparsable input is `0`.
///
/// ```
/// use stow_config::human_readable_to_bytes;
/// assert_eq!(human_readable_to_bytes("1k"), 1024);
/// assert_eq!(human_readable_to_bytes("2M"), 2_097_152);
/// assert_eq!(human_readable_to_bytes("1024"), 1024);
/// ```
pub fn human_readable_to_bytes(input: &str) -> u64 {
    let trimmed = input.trim();
    if let Some(number) = numeric(trimmed) {
        return number;
    }
    let number = leading_integer(trimmed);
    match trimmed.chars().last().and_then(unit) {
        Some(multiplier) => number.saturating_mul(multiplier),
        None => number,
    }
}

/// Value of a string that is entirely a number, truncated towards zero.
fn numeric(s: &str) -> Option<u64> {
    let looks_numeric = !s.is_empty()
        && s.chars().any(|c| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !looks_numeric {
        return None;
    }
    let value: f64 = s.parse().ok()?;
    // Float to int casts saturate, and NaN is already excluded above.
    Some(value.max(0.0).trunc() as u64)
}

/// Integer at the start of `s`, ignoring whatever follows it.
fn leading_integer(s: &str) -> u64 {
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).fold(0u64, |acc, d| {
        acc.saturating_mul(10).saturating_add(u64::from(d - b'0'))
    });
    if negative { 0 } else { digits }
}

/// Maximum accepted file size.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeLimit {
    Bytes(u64),
    Human(String),
}
impl SizeLimit {
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Bytes(bytes) => *bytes,
            Self::Human(human) => human_readable_to_bytes(human),
        }
    }
}
impl fmt::Display for SizeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "{bytes}"),
            Self::Human(human) => f.write_str(human),
        }
    }
}
impl From<u64> for SizeLimit {
    fn from(bytes: u64) -> Self {
        Self::Bytes(bytes)
    }
}
impl From<&str> for SizeLimit {
    fn from(human: &str) -> Self {
        Self::Human(human.to_string())
    }
}
