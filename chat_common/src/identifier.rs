//! Bounded name tokens shared by users and rooms.
//!
//! An `Identifier` is a non-empty byte string of length 1..=20 containing no
//! space, tab, carriage return or newline. Comparison is byte-exact, so
//! `Identifier` derives `Eq`/`Hash` directly off its stored bytes rather than
//! normalizing case or whitespace.

use std::fmt;

/// Maximum length, in bytes, of an [`Identifier`].
pub const MAX_IDENTIFIER_LEN: usize = 20;

/// Reasons an identifier candidate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier exceeds {MAX_IDENTIFIER_LEN} bytes")]
    TooLong,
    #[error("identifier contains whitespace")]
    ContainsWhitespace,
}

/// A validated 1..=20 byte name with no whitespace, used for both user and
/// room names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    /// Validates `candidate` against the Identifier rules and wraps it.
    pub fn parse(candidate: &str) -> Result<Self, IdentifierError> {
        if candidate.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if candidate.len() > MAX_IDENTIFIER_LEN {
            return Err(IdentifierError::TooLong);
        }
        if candidate
            .bytes()
            .any(|b| b == b' ' || b == b'\t' || b == b'\r' || b == b'\n')
        {
            return Err(IdentifierError::ContainsWhitespace);
        }
        Ok(Self(candidate.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
