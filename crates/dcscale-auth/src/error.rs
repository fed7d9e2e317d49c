//! Authentication error types.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while obtaining a session token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The control plane rejected the login request.
    #[error("login rejected with HTTP {status}: {body}")]
    LoginRejected {
        /// HTTP status returned by the login endpoint.
        status: u16,
        /// Response body, as returned.
        body: String,
    },

    /// The login succeeded but the response did not carry a session cookie.
    #[error("login response is missing the {0} cookie")]
    MissingSessionCookie(&'static str),

    /// The login request could not be delivered (DNS, connect, timeout).
    #[error("login request failed: {0}")]
    Transport(String),

    /// The session token is not usable as a header value.
    #[error("invalid session token: {0}")]
    InvalidToken(String),
}

impl AuthError {
    /// Returns `true` if a later attempt might succeed without operator action.
    ///
    /// The authenticator itself never retries; this is for callers deciding
    /// whether to re-invoke a lifecycle transition.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::LoginRejected { status, .. } => *status >= 500,
            Self::MissingSessionCookie(_) | Self::InvalidToken(_) => false,
        }
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::LoginRejected { status, .. } if *status == 401 || *status == 403 => *status,
            Self::LoginRejected { .. }
            | Self::MissingSessionCookie(_)
            | Self::Transport(_)
            | Self::InvalidToken(_) => 502,
        }
    }
}
