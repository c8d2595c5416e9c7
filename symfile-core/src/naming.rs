//! Symbolic variable names for file chunks.
//!
//! The template is a wire format shared with the test-case generator that
//! rebuilds concrete files from solver assignments; changing it breaks that
//! consumer.

use std::fmt;

pub const NAME_PREFIX: &str = "__symfile___";
pub const NAME_SUFFIX: &str = "_symfile__";
const ID_SEPARATOR: &str = "__";
const COUNT_SEPARATOR: char = '_';

/// Encode a cleaned identifier, chunk index and total chunk count into a variable name.
///
/// The identifier is used as-is; callers sanitize it first (see [`clean_identifier`]).
pub fn encode(identifier: &str, index: u64, total: u64) -> String {
    format!("{NAME_PREFIX}{identifier}{ID_SEPARATOR}{index}{COUNT_SEPARATOR}{total}{NAME_SUFFIX}")
}

/// Replace every byte that is not ASCII alphanumeric with `_`.
pub fn clean_identifier(raw: &str) -> String {
    raw.bytes().map(|b| if b.is_ascii_alphanumeric() { b as char } else { '_' }).collect()
}

/// Decoded form of a chunk variable name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChunkName {
    pub identifier: String,
    pub index: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("missing `__symfile___` prefix")]
    Prefix,
    #[error("missing `_symfile__` suffix")]
    Suffix,
    #[error("malformed chunk fields in {0:?}")]
    Fields(String),
    #[error("chunk index {index} out of range for {total} chunks")]
    Range { index: u64, total: u64 },
}

impl ChunkName {
    pub fn new(identifier: impl Into<String>, index: u64, total: u64) -> Self {
        Self { identifier: identifier.into(), index, total }
    }

    pub fn encode(&self) -> String {
        encode(&self.identifier, self.index, self.total)
    }

    /// Parse a name produced by [`encode`].
    ///
    /// Numeric fields are taken from the right, so identifiers that contain
    /// underscores still decode to exactly what was encoded.
    pub fn parse(name: &str) -> Result<Self, NameError> {
        let body = name.strip_prefix(NAME_PREFIX).ok_or(NameError::Prefix)?;
        let body = body.strip_suffix(NAME_SUFFIX).ok_or(NameError::Suffix)?;
        let fields = || NameError::Fields(body.to_string());

        let (rest, total) = body.rsplit_once(COUNT_SEPARATOR).ok_or_else(fields)?;
        let (identifier, index) = rest.rsplit_once(ID_SEPARATOR).ok_or_else(fields)?;
        let index = parse_decimal(index).ok_or_else(fields)?;
        let total = parse_decimal(total).ok_or_else(fields)?;
        if index >= total {
            return Err(NameError::Range { index, total });
        }
        Ok(Self { identifier: identifier.to_string(), index, total })
    }
}

impl fmt::Display for ChunkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn parse_decimal(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
