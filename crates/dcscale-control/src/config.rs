//! Controller configuration.
//!
//! A `ControllerConfig` is built once at process start (from CLI flags and
//! environment, or deserialized) and handed to the authenticator, the HTTP
//! client and the lifecycle controller.

use std::fmt;
use std::time::Duration;

use dcscale_auth::{AuthConfig, Credentials};
use serde::Deserialize;

use crate::controller::LifecycleConfig;
use crate::drain::DrainPolicy;
use crate::error::{ControlError, Result};

/// Configuration for the lifecycle controller.
#[derive(Clone, Deserialize)]
pub struct ControllerConfig {
    /// Base URL of the control plane.
    pub base_url: String,

    /// Organization the fleet belongs to.
    pub organization: String,

    /// Service account user name; also granted access on every node.
    pub username: String,

    /// Service account password.
    #[serde(default)]
    pub password: String,

    /// Value sent in the `X-Requested-By` header.
    #[serde(default = "ControllerConfig::default_client_id")]
    pub client_id: String,

    /// Per-request timeout for control plane calls, in seconds.
    #[serde(default = "ControllerConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Time between drain polls, in seconds.
    #[serde(default = "ControllerConfig::default_drain_interval")]
    pub drain_interval_seconds: u64,

    /// Maximum drain wait, in seconds.
    #[serde(default = "ControllerConfig::default_drain_timeout")]
    pub drain_timeout_seconds: u64,

    /// Remove duplicate job ids before asking the control plane to rebalance.
    #[serde(default = "ControllerConfig::default_dedupe")]
    pub dedupe_balance_jobs: bool,
}

impl ControllerConfig {
    /// Create a configuration with default timeouts.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        organization: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            organization: organization.into(),
            username: username.into(),
            password: password.into(),
            client_id: Self::default_client_id(),
            request_timeout_seconds: Self::default_request_timeout(),
            drain_interval_seconds: Self::default_drain_interval(),
            drain_timeout_seconds: Self::default_drain_timeout(),
            dedupe_balance_jobs: Self::default_dedupe(),
        }
    }

    fn default_client_id() -> String {
        "SDC".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    const fn default_drain_interval() -> u64 {
        5
    }

    const fn default_drain_timeout() -> u64 {
        3600 // 1 hour
    }

    const fn default_dedupe() -> bool {
        true
    }

    /// Check that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ControlError::InvalidConfig(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.organization.trim().is_empty() || self.organization.contains('/') {
            return Err(ControlError::InvalidConfig(
                "organization must be non-empty and must not contain '/'".to_string(),
            ));
        }
        if self.username.trim().is_empty() {
            return Err(ControlError::InvalidConfig(
                "username must not be empty".to_string(),
            ));
        }
        if self.drain_interval_seconds == 0 {
            return Err(ControlError::InvalidConfig(
                "drain_interval_seconds must be positive".to_string(),
            ));
        }
        if self.drain_timeout_seconds < self.drain_interval_seconds {
            return Err(ControlError::InvalidConfig(
                "drain_timeout_seconds must be at least drain_interval_seconds".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the control plane request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the drain poll interval and deadline.
    #[must_use]
    pub const fn drain_policy(&self) -> DrainPolicy {
        DrainPolicy {
            interval: Duration::from_secs(self.drain_interval_seconds),
            timeout: Duration::from_secs(self.drain_timeout_seconds),
        }
    }

    /// Configuration for the session authenticator.
    #[must_use]
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            base_url: self.base_url.clone(),
            client_id: self.client_id.clone(),
            request_timeout_seconds: self.request_timeout_seconds,
        }
    }

    /// The service account credentials.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }

    /// Configuration for the lifecycle controller.
    #[must_use]
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            organization: self.organization.clone(),
            service_user: self.username.clone(),
            drain: self.drain_policy(),
            dedupe_balance_jobs: self.dedupe_balance_jobs,
        }
    }
}

impl fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("drain_interval_seconds", &self.drain_interval_seconds)
            .field("drain_timeout_seconds", &self.drain_timeout_seconds)
            .field("dedupe_balance_jobs", &self.dedupe_balance_jobs)
            .finish()
    }
}
