//! HTTP surface for lifecycle events.
//!
//! # Routes
//!
//! - `GET /health` - Liveness
//! - `GET /ready` - Readiness; 503 once shutdown has started
//! - `POST /v1/lifecycle` - Run one lifecycle event
//!
//! `POST /v1/lifecycle` takes the inbound event as its body and answers with
//! the outbound result. The status is 200 on success and the error's status
//! code otherwise, so the result body is always `{"response"}` or `{"error"}`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use dcscale_auth::Authenticator;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::client::ControlPlaneClient;
use crate::error::ControlError;
use crate::handler::{LifecycleHandler, LifecycleOutcome};

/// Shared state for the HTTP handlers.
pub struct AppState<A, C> {
    /// Runs lifecycle events.
    pub handler: Arc<LifecycleHandler<A, C>>,
    /// Process shutdown signal; each request derives a child token from it.
    pub shutdown: CancellationToken,
}

impl<A, C> AppState<A, C> {
    /// Create a new state.
    #[must_use]
    pub fn new(handler: Arc<LifecycleHandler<A, C>>, shutdown: CancellationToken) -> Self {
        Self { handler, shutdown }
    }
}

impl<A, C> Clone for AppState<A, C> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Status body for `/health` and `/ready`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Create the router.
pub fn create_router<A, C>(state: AppState<A, C>) -> Router
where
    A: Authenticator + 'static,
    C: ControlPlaneClient + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready::<A, C>))
        .route("/v1/lifecycle", post(lifecycle::<A, C>))
        .with_state(state)
}

/// Serve the router on `listener` until the shutdown token fires.
///
/// In-flight drains observe the same shutdown through their child tokens and
/// return `DrainCancelled`, so shutdown does not wait out a drain deadline.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve<A, C>(listener: TcpListener, state: AppState<A, C>) -> std::io::Result<()>
where
    A: Authenticator + 'static,
    C: ControlPlaneClient + 'static,
{
    let shutdown = state.shutdown.clone();
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Lifecycle server listening");
    }
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(StatusResponse {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

async fn ready<A, C>(State(state): State<AppState<A, C>>) -> impl IntoResponse {
    if state.shutdown.is_cancelled() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(StatusResponse {
                status: "shutting_down",
                version: env!("CARGO_PKG_VERSION"),
            }),
        );
    }
    (
        StatusCode::OK,
        Json(StatusResponse {
            status: "ready",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

async fn lifecycle<A, C>(State(state): State<AppState<A, C>>, body: Bytes) -> impl IntoResponse
where
    A: Authenticator + 'static,
    C: ControlPlaneClient + 'static,
{
    let event: Value = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            let err = ControlError::InvalidInput(format!("event is not valid JSON: {e}"));
            return (
                StatusCode::BAD_REQUEST,
                Json(LifecycleOutcome::Error(err.to_string())),
            );
        }
    };

    let cancel = state.shutdown.child_token();
    let result = state.handler.handle_event(&event, &cancel).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(err) => StatusCode::from_u16(err.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    };
    (status, Json(LifecycleOutcome::from(result)))
}
