//! Lifecycle event entry point.
//!
//! Turns an inbound event into a typed request, logs in, dispatches to the
//! controller and shapes the outbound result. Events are validated before
//! login so a malformed event costs no control plane calls.

use std::sync::Arc;

use dcscale_auth::{Authenticator, Credentials};
use dcscale_core::{LabelSet, SdcId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::client::ControlPlaneClient;
use crate::controller::NodeLifecycleController;
use crate::error::{ControlError, Result};
use crate::lifecycle::Transition;

/// Response value of a successful post-start or pre-stop.
pub const SUCCESS: &str = "Success";

/// Inbound event as sent by the fleet manager.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LifecycleEvent {
    /// `pre-start`, `post-start` or `pre-stop`.
    #[serde(default)]
    pub action: Option<String>,
    /// Node id; required for post-start and pre-stop.
    #[serde(default, rename = "sdcId")]
    pub sdc_id: Option<String>,
    /// Comma-separated labels; required for post-start.
    #[serde(default)]
    pub labels: Option<String>,
    /// Group granted access to the node; required for post-start.
    #[serde(default)]
    pub groups: Option<String>,
}

/// A validated lifecycle request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleRequest {
    /// Issue an auth token for a node about to boot.
    PreStart,
    /// Grant access to, label and rebalance onto a started node.
    PostStart {
        /// Node id.
        sdc_id: SdcId,
        /// Labels to assign.
        labels: LabelSet,
        /// Group granted access.
        group: String,
    },
    /// Drain and remove a node.
    PreStop {
        /// Node id.
        sdc_id: SdcId,
    },
}

impl LifecycleRequest {
    /// Validate a raw JSON event.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidInput` if the event is not an object or a
    /// required field is missing or invalid, and
    /// `ControlError::UnsupportedAction` for an unknown action.
    pub fn from_value(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(ControlError::InvalidInput(
                "event must be a JSON object".to_string(),
            ));
        }
        let event: LifecycleEvent = serde_json::from_value(value.clone())
            .map_err(|e| ControlError::InvalidInput(e.to_string()))?;
        Self::from_event(event)
    }

    /// Validate a decoded event.
    ///
    /// # Errors
    ///
    /// See [`LifecycleRequest::from_value`].
    pub fn from_event(event: LifecycleEvent) -> Result<Self> {
        let action = event
            .action
            .ok_or_else(|| ControlError::InvalidInput("action missing in request".to_string()))?;

        match action.parse::<Transition>()? {
            Transition::PreStart => Ok(Self::PreStart),
            Transition::PostStart => {
                let sdc_id = SdcId::new(required(event.sdc_id, "sdcId")?)?;
                let labels = LabelSet::parse_csv(&required(event.labels, "labels")?)?;
                let group = required(event.groups, "groups")?;
                Ok(Self::PostStart {
                    sdc_id,
                    labels,
                    group,
                })
            }
            Transition::PreStop => {
                let sdc_id = SdcId::new(required(event.sdc_id, "sdcId")?)?;
                Ok(Self::PreStop { sdc_id })
            }
        }
    }

    /// The transition this request performs.
    #[must_use]
    pub const fn transition(&self) -> Transition {
        match self {
            Self::PreStart => Transition::PreStart,
            Self::PostStart { .. } => Transition::PostStart,
            Self::PreStop { .. } => Transition::PreStop,
        }
    }
}

/// A present, non-blank field with surrounding whitespace dropped.
fn required(field: Option<String>, name: &str) -> Result<String> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ControlError::InvalidInput(format!(
            "{name} missing in request"
        ))),
    }
}

/// Outbound result: `{"response": ...}` or `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleOutcome {
    /// The transition completed.
    Response(Value),
    /// The transition failed; the message of the first failing step.
    Error(String),
}

impl From<Result<Value>> for LifecycleOutcome {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(value) => Self::Response(value),
            Err(err) => Self::Error(err.to_string()),
        }
    }
}

/// Logs in and runs lifecycle requests.
pub struct LifecycleHandler<A, C> {
    authenticator: Arc<A>,
    credentials: Credentials,
    controller: NodeLifecycleController<C>,
}

impl<A: Authenticator, C: ControlPlaneClient> LifecycleHandler<A, C> {
    /// Create a new handler.
    #[must_use]
    pub fn new(
        authenticator: Arc<A>,
        credentials: Credentials,
        controller: NodeLifecycleController<C>,
    ) -> Self {
        Self {
            authenticator,
            credentials,
            controller,
        }
    }

    /// Get the controller.
    #[must_use]
    pub const fn controller(&self) -> &NodeLifecycleController<C> {
        &self.controller
    }

    /// Log in and run a validated request.
    ///
    /// Returns the issued token for pre-start and `"Success"` otherwise.
    ///
    /// # Errors
    ///
    /// Returns the login error or the first failing step's error.
    pub async fn execute(
        &self,
        request: &LifecycleRequest,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let token = self.authenticator.login(&self.credentials).await?;

        match request {
            LifecycleRequest::PreStart => {
                let issued = self.controller.pre_start(&token).await?;
                Ok(Value::String(issued))
            }
            LifecycleRequest::PostStart {
                sdc_id,
                labels,
                group,
            } => {
                self.controller
                    .post_start(&token, sdc_id, labels, group)
                    .await?;
                Ok(Value::from(SUCCESS))
            }
            LifecycleRequest::PreStop { sdc_id } => {
                self.controller.pre_stop(&token, sdc_id, cancel).await?;
                Ok(Value::from(SUCCESS))
            }
        }
    }

    /// Validate, log in and run a raw event.
    ///
    /// # Errors
    ///
    /// Returns the validation, login or step error.
    pub async fn handle_event(&self, event: &Value, cancel: &CancellationToken) -> Result<Value> {
        let request = LifecycleRequest::from_value(event).inspect_err(|err| {
            tracing::warn!(error = %err, "Rejected lifecycle event");
        })?;

        let transition = request.transition();
        tracing::info!(transition = %transition, "Handling lifecycle event");

        match self.execute(&request, cancel).await {
            Ok(value) => {
                tracing::info!(transition = %transition, "Lifecycle transition completed");
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(
                    transition = %transition,
                    error = %err,
                    retriable = err.is_retriable(),
                    "Lifecycle transition failed"
                );
                Err(err)
            }
        }
    }

    /// Run a raw event and shape the outbound result. Never fails.
    pub async fn handle(&self, event: &Value, cancel: &CancellationToken) -> LifecycleOutcome {
        self.handle_event(event, cancel).await.into()
    }
}
