//! Control plane login client.
//!
//! This module exchanges service account credentials for a session token.
//! Login is attempted once; any failure is surfaced to the caller as-is.

use std::fmt;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::Serialize;

use crate::error::{AuthError, Result};
use crate::token::SessionToken;
use crate::{AuthConfig, CLIENT_ID_HEADER};

/// Cookie carrying the session token in a successful login response.
pub const SESSION_COOKIE: &str = "SS-SSO-LOGIN";

/// Service account credentials.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Service account user name.
    pub user_name: String,
    /// Service account password.
    pub password: String,
}

impl Credentials {
    /// Create credentials from a user name and password.
    #[must_use]
    pub fn new(user_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Trait for obtaining control plane session tokens.
///
/// This abstracts the login call so lifecycle handlers can be tested
/// without a control plane.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Log in and return a fresh session token.
    ///
    /// # Errors
    ///
    /// Returns an error if the login is rejected, the response carries no
    /// session token, or the request cannot be delivered.
    async fn login(&self, credentials: &Credentials) -> Result<SessionToken>;
}

/// Authenticator that logs in over HTTP.
pub struct SessionAuthenticator {
    config: AuthConfig,
    client: reqwest::Client,
}

impl SessionAuthenticator {
    /// Create a new authenticator with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Transport` if the HTTP client cannot be built.
    pub fn new(config: AuthConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AuthError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Create an authenticator with a custom reqwest client.
    #[must_use]
    pub fn with_client(config: AuthConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }
}

#[async_trait]
impl Authenticator for SessionAuthenticator {
    async fn login(&self, credentials: &Credentials) -> Result<SessionToken> {
        let url = self.config.login_url();
        tracing::debug!(url = %url, user = %credentials.user_name, "Logging in to control plane");

        let response = self
            .client
            .post(&url)
            .header(CLIENT_ID_HEADER, &self.config.client_id)
            .json(credentials)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Control plane rejected login");
            return Err(AuthError::LoginRejected {
                status: status.as_u16(),
                body,
            });
        }

        let token = session_cookie(response.headers())
            .ok_or(AuthError::MissingSessionCookie(SESSION_COOKIE))?;
        SessionToken::new(token)
    }
}

/// Extract the session token from the `Set-Cookie` headers, if present.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .filter(|(name, _)| name.trim() == SESSION_COOKIE)
        .map(|(_, value)| unquote(value.trim()))
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Strip the optional double quotes around a cookie value (RFC 6265 `cookie-value`).
fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value)
}

/// A mock authenticator for testing.
///
/// Either hands out a fixed token or rejects every login with the given status.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockAuthenticator {
    token: Option<String>,
    reject_status: u16,
    logins: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockAuthenticator {
    /// An authenticator that accepts every login and returns `token`.
    #[must_use]
    pub fn accepting(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            reject_status: 0,
            logins: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// An authenticator that rejects every login with `status`.
    #[must_use]
    pub fn rejecting(status: u16) -> Self {
        Self {
            token: None,
            reject_status: status,
            logins: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Number of login attempts seen so far.
    #[must_use]
    pub fn login_count(&self) -> usize {
        self.logins.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Authenticator for MockAuthenticator {
    async fn login(&self, _credentials: &Credentials) -> Result<SessionToken> {
        self.logins
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        match &self.token {
            Some(token) => SessionToken::new(token.clone()),
            None => Err(AuthError::LoginRejected {
                status: self.reject_status,
                body: "mock rejection".to_string(),
            }),
        }
    }
}
