//! Lifecycle controller for elastic data collector fleets.
//!
//! A fleet manager calls this controller at three points in a node's life.
//! Each call logs in to the control plane, runs a fixed sequence of REST
//! calls and reports success or the first error.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │           HTTP server (serve) / one-shot CLI (invoke)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ inbound event
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    LifecycleHandler                         │
//! │   validate event ─▶ login ─▶ dispatch ─▶ shape result       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 NodeLifecycleController                     │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  pre-start  │ │ post-start  │ │ pre-stop            │    │
//! │  │             │ │             │ │ (JobDrainWaiter)    │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!               ControlPlaneSession ─▶ ControlPlaneClient
//!                                            │ HTTPS
//!                                            ▼
//!                                      control plane
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use dcscale_auth::SessionAuthenticator;
//! use dcscale_control::{
//!     ControllerConfig, HttpControlPlaneClient, LifecycleHandler, NodeLifecycleController,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ControllerConfig::new(
//!     "https://control.example.com",
//!     "acme",
//!     "svc@acme",
//!     "secret",
//! );
//! config.validate()?;
//!
//! let client = Arc::new(HttpControlPlaneClient::new(
//!     config.base_url.clone(),
//!     config.client_id.clone(),
//!     config.request_timeout(),
//! )?);
//! let handler = LifecycleHandler::new(
//!     Arc::new(SessionAuthenticator::new(config.auth_config())?),
//!     config.credentials(),
//!     NodeLifecycleController::new(client, config.lifecycle_config()),
//! );
//!
//! let event = serde_json::json!({"action": "pre-stop", "sdcId": "node-1"});
//! let outcome = handler.handle(&event, &CancellationToken::new()).await;
//! println!("{}", serde_json::to_string(&outcome)?);
//! # Ok(())
//! # }
//! ```
//!
//! See the [`lifecycle`] module for the node state machine.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod api;
pub mod client;
pub mod config;
pub mod controller;
pub mod drain;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod server;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use api::{ControlPlaneSession, Permission, SubjectType};
pub use client::{ApiRequest, ControlPlaneClient, HttpControlPlaneClient};
pub use config::ControllerConfig;
pub use controller::{LifecycleConfig, NodeLifecycleController};
pub use drain::{DrainPolicy, DrainReport, JobDrainWaiter, JobSource};
pub use error::{ControlError, Result};
pub use handler::{LifecycleEvent, LifecycleHandler, LifecycleOutcome, LifecycleRequest};
pub use lifecycle::{NodeState, Transition};
pub use server::{create_router, AppState};

// Re-export commonly used types from dependencies for convenience
pub use dcscale_core::{JobId, LabelSet, SdcId};
