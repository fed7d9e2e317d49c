//! Control plane session authentication for dcscale.
//!
//! Every lifecycle invocation starts by exchanging the service account's
//! user name and password for a short-lived session token. The token is
//! scoped to that invocation and is never persisted.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────────┐
//! │ Lifecycle        │────▶│   Authenticator      │
//! │ handler          │     │   (trait)            │
//! └──────────────────┘     └──────────┬───────────┘
//!                                     │
//!                          ┌──────────▼───────────┐
//!                          │ SessionAuthenticator │
//!                          │ (impl)               │
//!                          └──────────┬───────────┘
//!                                     │ HTTPS
//!                          ┌──────────▼───────────┐
//!                          │  Control plane       │
//!                          │  login endpoint      │
//!                          └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use dcscale_auth::{AuthConfig, Authenticator, Credentials, SessionAuthenticator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig {
//!     base_url: "https://control.example.com".to_string(),
//!     ..AuthConfig::default()
//! };
//!
//! let authenticator = SessionAuthenticator::new(config)?;
//! let credentials = Credentials::new("svc@example.com", "secret");
//!
//! let token = authenticator.login(&credentials).await?;
//! println!("logged in: {token:?}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::time::Duration;

pub mod client;
pub mod error;
pub mod token;

pub use client::{Authenticator, Credentials, SessionAuthenticator, SESSION_COOKIE};
pub use error::{AuthError, Result};
pub use token::SessionToken;

#[cfg(any(test, feature = "test-utils"))]
pub use client::MockAuthenticator;

/// Header identifying the calling client to the control plane.
pub const CLIENT_ID_HEADER: &str = "X-Requested-By";

/// Configuration for authenticating against the control plane.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base URL of the control plane (e.g., `https://control.example.com`).
    pub base_url: String,
    /// Value sent in the `X-Requested-By` header.
    pub client_id: String,
    /// Timeout for the login request, in seconds.
    pub request_timeout_seconds: u64,
}

impl AuthConfig {
    /// Get the login endpoint URL.
    #[must_use]
    pub fn login_url(&self) -> String {
        format!(
            "{}/security/public-rest/v1/authentication/login",
            self.base_url.trim_end_matches('/')
        )
    }

    /// Get the login request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:18631".to_string(),
            client_id: "SDC".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.client_id, "SDC");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn login_url_ignores_trailing_slash() {
        let config = AuthConfig {
            base_url: "https://control.example.com/".to_string(),
            ..AuthConfig::default()
        };
        assert_eq!(
            config.login_url(),
            "https://control.example.com/security/public-rest/v1/authentication/login"
        );
    }

    #[test]
    fn auth_error_status_codes() {
        let rejected = AuthError::LoginRejected {
            status: 401,
            body: "bad credentials".into(),
        };
        assert_eq!(rejected.http_status_code(), 401);
        assert_eq!(AuthError::Transport("refused".into()).http_status_code(), 502);
        assert_eq!(
            AuthError::MissingSessionCookie(SESSION_COOKIE).http_status_code(),
            502
        );
    }

    #[test]
    fn auth_error_retriable() {
        assert!(AuthError::Transport("timeout".into()).is_retriable());
        assert!(AuthError::LoginRejected {
            status: 503,
            body: String::new()
        }
        .is_retriable());
        assert!(!AuthError::LoginRejected {
            status: 401,
            body: String::new()
        }
        .is_retriable());
        assert!(!AuthError::InvalidToken("empty".into()).is_retriable());
    }
}
