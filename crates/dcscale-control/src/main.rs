//! DCScale lifecycle controller.
//!
//! Runs either as an HTTP service that accepts lifecycle events from the fleet
//! manager (`serve`) or as a one-shot command that handles a single event and
//! prints the result (`invoke`).
//!
//! All settings come from flags or their `DCSCALE_*` environment variables.
//! Logs go to stderr so `invoke` output on stdout stays machine-readable.

use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dcscale_auth::SessionAuthenticator;
use dcscale_control::{
    server, AppState, ControlError, ControllerConfig, HttpControlPlaneClient, LifecycleHandler,
    LifecycleOutcome, NodeLifecycleController,
};

/// Lifecycle controller for elastic data collector fleets.
#[derive(Parser, Debug)]
#[command(name = "dcscale-control")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Control plane base URL.
    #[arg(long, env = "DCSCALE_BASE_URL")]
    base_url: String,

    /// Organization the fleet belongs to.
    #[arg(long, env = "DCSCALE_ORGANIZATION")]
    organization: String,

    /// Service account user name.
    #[arg(long, env = "DCSCALE_USERNAME")]
    username: String,

    /// Service account password.
    #[arg(long, env = "DCSCALE_PASSWORD", hide_env_values = true)]
    password: String,

    /// Value sent in the `X-Requested-By` header.
    #[arg(long, env = "DCSCALE_CLIENT_ID", default_value = "SDC")]
    client_id: String,

    /// Per-request timeout for control plane calls, in seconds.
    #[arg(long, env = "DCSCALE_REQUEST_TIMEOUT_SECONDS", default_value_t = 30)]
    request_timeout_seconds: u64,

    /// Time between drain polls, in seconds.
    #[arg(long, env = "DCSCALE_DRAIN_INTERVAL_SECONDS", default_value_t = 5)]
    drain_interval_seconds: u64,

    /// Maximum drain wait, in seconds.
    #[arg(long, env = "DCSCALE_DRAIN_TIMEOUT_SECONDS", default_value_t = 3600)]
    drain_timeout_seconds: u64,

    /// Pass duplicate job ids through to the rebalance call.
    #[arg(long, env = "DCSCALE_NO_DEDUPE_BALANCE_JOBS")]
    no_dedupe_balance_jobs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve lifecycle events over HTTP.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
        listen_addr: String,
    },
    /// Handle one lifecycle event and print the result.
    Invoke {
        /// Event JSON, `@path` to read it from a file, or `-` for stdin.
        #[arg(long)]
        event: String,
    },
}

impl Cli {
    fn controller_config(&self) -> ControllerConfig {
        let mut config = ControllerConfig::new(
            self.base_url.clone(),
            self.organization.clone(),
            self.username.clone(),
            self.password.clone(),
        );
        config.client_id.clone_from(&self.client_id);
        config.request_timeout_seconds = self.request_timeout_seconds;
        config.drain_interval_seconds = self.drain_interval_seconds;
        config.drain_timeout_seconds = self.drain_timeout_seconds;
        config.dedupe_balance_jobs = !self.no_dedupe_balance_jobs;
        config
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dcscale=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.controller_config();
    config.validate()?;

    tracing::info!(
        base_url = %config.base_url,
        organization = %config.organization,
        username = %config.username,
        drain_interval_seconds = config.drain_interval_seconds,
        drain_timeout_seconds = config.drain_timeout_seconds,
        dedupe_balance_jobs = config.dedupe_balance_jobs,
        "Controller configuration loaded"
    );

    let authenticator = Arc::new(SessionAuthenticator::new(config.auth_config())?);
    let client = Arc::new(HttpControlPlaneClient::new(
        config.base_url.clone(),
        config.client_id.clone(),
        config.request_timeout(),
    )?);
    let controller = NodeLifecycleController::new(client, config.lifecycle_config());
    let handler = Arc::new(LifecycleHandler::new(
        authenticator,
        config.credentials(),
        controller,
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_shutdown(shutdown.clone()));

    match cli.command {
        Command::Serve { listen_addr } => {
            tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
            let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
            server::serve(listener, AppState::new(handler, shutdown)).await?;
            tracing::info!("Server stopped");
            Ok(ExitCode::SUCCESS)
        }
        Command::Invoke { event } => {
            let result = match read_event(&event) {
                Ok(event) => handler.handle_event(&event, &shutdown).await,
                Err(err) => Err(err),
            };
            let code = if result.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
            println!("{}", serde_json::to_string(&LifecycleOutcome::from(result))?);
            Ok(code)
        }
    }
}

/// Load the event argument of `invoke`.
fn read_event(arg: &str) -> Result<Value, ControlError> {
    let raw = if arg == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| ControlError::InvalidInput(format!("failed to read event from stdin: {e}")))?;
        buf
    } else if let Some(path) = arg.strip_prefix('@') {
        std::fs::read_to_string(path).map_err(|e| {
            ControlError::InvalidInput(format!("failed to read event file {path}: {e}"))
        })?
    } else {
        arg.to_string()
    };

    serde_json::from_str(&raw)
        .map_err(|e| ControlError::InvalidInput(format!("event is not valid JSON: {e}")))
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
async fn watch_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("Shutdown requested, cancelling in-flight transitions");
    shutdown.cancel();
}
