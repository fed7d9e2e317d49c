//! Node lifecycle state machine.
//!
//! The controller keeps no state between invocations; this module describes
//! the states a node passes through on the control plane and which lifecycle
//! transition moves it between them.
//!
//! # State Machine
//!
//! ```text
//!     ┌─────────────┐
//!     │ Provisioned │   node launched by the fleet manager
//!     └──────┬──────┘
//!            │ pre-start (issue auth token)
//!            ▼
//!     ┌─────────────┐
//!     │ Authorized  │
//!     └──────┬──────┘
//!            │ post-start (ACL, labels, rebalance)
//!            ▼
//!     ┌─────────────┐
//!     │   Active    │
//!     └──────┬──────┘
//!            │ pre-stop: strip labels, sync jobs
//!            ▼
//!     ┌─────────────┐
//!     │  Draining   │   wait until no migratable jobs remain
//!     └──────┬──────┘
//!            │ pre-stop: deactivate + delete auth token
//!            ▼
//!     ┌─────────────┐
//!     │ Deactivated │
//!     └──────┬──────┘
//!            │ pre-stop: delete node resource
//!            ▼
//!     ┌─────────────┐
//!     │   Deleted   │
//!     └─────────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// State of a node as seen by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Launched, not yet known to the control plane.
    Provisioned,
    /// Holds an auth token.
    Authorized,
    /// Labeled and eligible for job placement.
    Active,
    /// Unlabeled; waiting for jobs to move away.
    Draining,
    /// Auth token deactivated and deleted.
    Deactivated,
    /// Node resource deleted.
    Deleted,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Provisioned => "provisioned",
            Self::Authorized => "authorized",
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Deactivated => "deactivated",
            Self::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// A lifecycle transition requested by the fleet manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Before the node boots: issue its auth token.
    PreStart,
    /// After the node boots: grant access, label it and rebalance jobs.
    PostStart,
    /// Before the node is torn down: drain it and remove it.
    PreStop,
}

impl Transition {
    /// Every transition, in lifecycle order.
    pub const ALL: [Self; 3] = [Self::PreStart, Self::PostStart, Self::PreStop];

    /// The action name used in lifecycle events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreStart => "pre-start",
            Self::PostStart => "post-start",
            Self::PreStop => "pre-stop",
        }
    }

    /// The state a node is expected to be in before this transition.
    #[must_use]
    pub const fn from_state(self) -> NodeState {
        match self {
            Self::PreStart => NodeState::Provisioned,
            Self::PostStart => NodeState::Authorized,
            Self::PreStop => NodeState::Active,
        }
    }

    /// The state a node is in after this transition completes.
    #[must_use]
    pub const fn target_state(self) -> NodeState {
        match self {
            Self::PreStart => NodeState::Authorized,
            Self::PostStart => NodeState::Active,
            Self::PreStop => NodeState::Deleted,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transition {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ControlError::UnsupportedAction(s.to_string()))
    }
}

/// Check if a state transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: NodeState, to: NodeState) -> bool {
    use NodeState::{Active, Authorized, Deactivated, Deleted, Draining, Provisioned};

    matches!(
        (from, to),
        (Provisioned, Authorized)
            | (Authorized, Active)
            | (Active, Draining)
            | (Draining, Deactivated)
            | (Deactivated, Deleted)
    )
}

/// Returns true once the node no longer exists on the control plane.
#[must_use]
pub const fn is_terminal(state: NodeState) -> bool {
    matches!(state, NodeState::Deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        use NodeState::*;

        assert!(is_valid_transition(Provisioned, Authorized));
        assert!(is_valid_transition(Authorized, Active));
        assert!(is_valid_transition(Active, Draining));
        assert!(is_valid_transition(Draining, Deactivated));
        assert!(is_valid_transition(Deactivated, Deleted));
    }

    #[test]
    fn invalid_transitions() {
        use NodeState::*;

        // Teardown can't skip the drain
        assert!(!is_valid_transition(Active, Deactivated));
        assert!(!is_valid_transition(Active, Deleted));
        // No way back once draining
        assert!(!is_valid_transition(Draining, Active));
        // Deleted is terminal
        assert!(!is_valid_transition(Deleted, Provisioned));
    }

    #[test]
    fn transition_endpoints() {
        assert_eq!(Transition::PreStart.from_state(), NodeState::Provisioned);
        assert_eq!(Transition::PreStart.target_state(), NodeState::Authorized);
        assert_eq!(Transition::PostStart.target_state(), NodeState::Active);
        assert_eq!(Transition::PreStop.from_state(), NodeState::Active);
        assert!(is_terminal(Transition::PreStop.target_state()));
    }

    #[test]
    fn parse_action_names() {
        for transition in Transition::ALL {
            assert_eq!(transition.as_str().parse::<Transition>().unwrap(), transition);
        }
        let err = "restart".parse::<Transition>().unwrap_err();
        assert!(matches!(err, ControlError::UnsupportedAction(a) if a == "restart"));
    }
}
