//! Signature records and their on-disk text form.
//!
//! A signature file holds one lowercase 32-bit hex word per line without a
//! `0x` prefix. Lines starting with `#` are comments and never data. A file
//! with no data lines but at least one comment is a sentinel: it states why
//! the signature is unavailable and parses as [`SignatureOutcome::Unavailable`].

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::common::constants::COMMENT_PREFIX;
use crate::common::{HarnessError, Result};

/// Which side of a comparison a signature belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The core under test.
    Dut,
    /// The golden model.
    Reference,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dut => "dut",
            Self::Reference => "reference",
        })
    }
}

/// Normalizes one signature word for comparison.
///
/// Trims whitespace, lowercases and strips a leading `0x`.
pub fn normalize(word: &str) -> String {
    let lower = word.trim().to_ascii_lowercase();
    match lower.strip_prefix("0x") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}

/// Ordered sequence of signature words.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SignatureRecord {
    words: Vec<String>,
}

impl SignatureRecord {
    /// Builds a record from words as they appear in the file (trimmed).
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words.into_iter().map(|w| w.into().trim().to_string()).collect(),
        }
    }

    /// Builds a record from numeric values, formatted as `%08x`.
    pub fn from_values(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            words: values.into_iter().map(|v| format!("{v:08x}")).collect(),
        }
    }

    /// Returns the words in order.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Returns the number of words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Returns `true` if the record holds no words.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Serializes to the file format, one word per line.
    pub fn to_text(&self) -> String {
        let mut s = String::with_capacity(self.words.len() * 9);
        for w in &self.words {
            s.push_str(w);
            s.push('\n');
        }
        s
    }

    /// Writes the record to `path`, replacing any existing file.
    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_text()).map_err(|e| HarnessError::io(path, e))
    }
}

/// A signature that is either present or explicitly unavailable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SignatureOutcome {
    /// Data was produced.
    Available(SignatureRecord),
    /// No data; the reason is kept for the report.
    Unavailable {
        /// Why the signature could not be obtained.
        reason: String,
    },
}

impl SignatureOutcome {
    /// Parses signature text.
    ///
    /// Comment lines are dropped. Blank lines before the first and after the
    /// last data line are ignored; blank lines in between are kept as empty
    /// words, which never match.
    pub fn parse(text: &str) -> Self {
        let mut comments = Vec::new();
        let mut data = Vec::new();
        for line in text.lines().map(str::trim) {
            if let Some(c) = line.strip_prefix(COMMENT_PREFIX) {
                comments.push(c.trim());
            } else {
                data.push(line);
            }
        }
        let first = data.iter().position(|l| !l.is_empty());
        let last = data.iter().rposition(|l| !l.is_empty());
        match (first, last) {
            (Some(a), Some(b)) => Self::Available(SignatureRecord::from_words(
                data.get(a..=b).unwrap_or_default().iter().copied(),
            )),
            _ if !comments.is_empty() => Self::Unavailable {
                reason: sentinel_reason(&comments),
            },
            _ => Self::Available(SignatureRecord::default()),
        }
    }

    /// Reads and parses a signature file; a missing file is unavailable.
    pub fn read(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::Unavailable {
                reason: format!("no signature file at {}", path.display()),
            }),
            Err(e) => Err(HarnessError::io(path, e)),
        }
    }

    /// Returns the record if available.
    pub const fn record(&self) -> Option<&SignatureRecord> {
        match self {
            Self::Available(r) => Some(r),
            Self::Unavailable { .. } => None,
        }
    }

    /// Returns `true` if data is present.
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

fn sentinel_reason(comments: &[&str]) -> String {
    let first = comments.first().copied().unwrap_or_default();
    first
        .split_once("unavailable:")
        .map_or(first, |(_, r)| r)
        .trim()
        .to_string()
}

/// Writes an explicit unavailability sentinel for `role` at `path`.
pub fn write_sentinel(path: &Path, role: Role, reason: &str) -> Result<()> {
    let one_line = reason.lines().next().unwrap_or_default();
    let text = format!("{COMMENT_PREFIX} {role} unavailable: {one_line}\n");
    std::fs::write(path, text).map_err(|e| HarnessError::io(path, e))
}
