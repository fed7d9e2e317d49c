//! Session token type.

use std::fmt;

use crate::error::{AuthError, Result};

/// A control plane session token.
///
/// The token lives for a single lifecycle invocation. Its `Debug` output is
/// redacted so it can be passed through `tracing` fields safely.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a raw token value.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the value is empty or contains
    /// characters that cannot be sent in an HTTP header.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(AuthError::InvalidToken("token is empty".to_string()));
        }
        if !value.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(AuthError::InvalidToken(
                "token contains non-printable characters".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// The raw token value, for use in request headers.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}
