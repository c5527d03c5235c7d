//! Canonical identifier type used throughout superscore.
//!
//! The `ID` type wraps a UUID. Identifiers arriving as strings are parsed
//! into an `ID` at the boundary so internal code never carries raw strings.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors produced while parsing an identifier.
#[non_exhaustive]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdError {
    /// The string is not a valid UUID.
    #[error("Invalid entry id {input:?}: {reason}")]
    InvalidFormat {
        /// The rejected input
        input: String,
        /// Parser diagnostic
        reason: String,
    },
}

impl From<IdError> for crate::Error {
    fn from(err: IdError) -> Self {
        crate::Error::Id(err)
    }
}

/// The unique identifier of an `Entry`.
///
/// Equality and hashing are by UUID value. The nil UUID is reserved as a
/// placeholder for "not yet assigned"; backends replace it on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ID(Uuid);

impl ID {
    /// Creates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The placeholder identifier.
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Parses an identifier from its string form.
    pub fn parse(s: impl AsRef<str>) -> Result<Self, IdError> {
        let s = s.as_ref();
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| IdError::InvalidFormat {
                input: s.to_string(),
                reason: e.to_string(),
            })
    }

    /// Returns true for the placeholder identifier.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Lowercase hyphenated form, as used in file names and JSON.
    pub fn to_hyphenated(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl Default for ID {
    fn default() -> Self {
        Self::generate()
    }
}

impl From<Uuid> for ID {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<ID> for Uuid {
    fn from(id: ID) -> Self {
        id.0
    }
}

impl FromStr for ID {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for ID {
    type Error = IdError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ID {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl PartialEq<Uuid> for ID {
    fn eq(&self, other: &Uuid) -> bool {
        &self.0 == other
    }
}
