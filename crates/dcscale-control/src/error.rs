//! Error types for the lifecycle controller.
//!
//! This module defines all errors that can occur while handling a lifecycle
//! event, from input validation through control plane calls and drain waits.

use std::time::Duration;

use dcscale_auth::AuthError;
use dcscale_core::{IdError, SdcId};
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in lifecycle controller operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The control plane could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// Logging in to the control plane failed.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// The control plane answered with a non-2xx status.
    #[error("control plane returned HTTP {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned.
        body: String,
    },

    /// The control plane answered with a body we could not interpret.
    #[error("unexpected control plane response: {0}")]
    Decode(String),

    /// Jobs were still assigned to the node when the drain deadline passed.
    #[error("node {sdc_id} still has {remaining} job(s) after waiting {waited:?}")]
    DrainTimeout {
        /// The node being drained.
        sdc_id: SdcId,
        /// Non-local jobs still assigned at the last poll.
        remaining: usize,
        /// Time spent waiting.
        waited: Duration,
    },

    /// The drain wait was cancelled by the caller.
    #[error("drain of node {0} was cancelled")]
    DrainCancelled(SdcId),

    /// The lifecycle event is missing a field or has an invalid value.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The lifecycle event names an action we do not handle.
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    /// The controller configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<IdError> for ControlError {
    fn from(err: IdError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl ControlError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::UnsupportedAction(_) => 400,
            Self::Auth(err) => err.http_status_code(),
            Self::Transport(_) | Self::Api { .. } | Self::Decode(_) => 502,
            Self::DrainCancelled(_) => 503,
            Self::DrainTimeout { .. } => 504,
            Self::InvalidConfig(_) => 500,
        }
    }

    /// Returns true if re-invoking the same transition might succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::DrainTimeout { .. } | Self::DrainCancelled(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Auth(err) => err.is_retriable(),
            Self::Decode(_)
            | Self::InvalidInput(_)
            | Self::UnsupportedAction(_)
            | Self::InvalidConfig(_) => false,
        }
    }
}
