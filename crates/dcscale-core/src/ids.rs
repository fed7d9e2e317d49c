//! Identifier types for dcscale.
//!
//! Node and job identifiers are opaque strings issued by the control plane.
//! `SdcId` is validated on construction because it is interpolated into
//! request paths; `JobId` is only ever read back from control plane responses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Characters that may not appear in an identifier used as a URL path segment.
const RESERVED_PATH_CHARS: [char; 3] = ['/', '?', '#'];

/// Errors that can occur when parsing identifiers and labels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The value was empty or only whitespace.
    #[error("{kind} must not be empty")]
    Empty {
        /// What kind of value was being parsed.
        kind: &'static str,
    },

    /// The value contains a character that is not allowed.
    #[error("{kind} contains invalid character {ch:?}")]
    InvalidCharacter {
        /// What kind of value was being parsed.
        kind: &'static str,
        /// The offending character.
        ch: char,
    },
}

/// Identifier of a data collector node registered with the control plane.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SdcId(String);

impl SdcId {
    /// Create a new `SdcId`, validating that it is usable as a path segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is blank or contains `/`, `?` or `#`.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(IdError::Empty { kind: "sdcId" });
        }
        if let Some(ch) = value.chars().find(|c| RESERVED_PATH_CHARS.contains(c)) {
            return Err(IdError::InvalidCharacter { kind: "sdcId", ch });
        }
        Ok(Self(value))
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SdcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SdcId({})", self.0)
    }
}

impl fmt::Display for SdcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SdcId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SdcId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SdcId> for String {
    fn from(id: SdcId) -> Self {
        id.0
    }
}

/// Identifier of a job as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Create a new `JobId`.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
