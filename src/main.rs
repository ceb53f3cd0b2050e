//! sa-delete-webhook - blocks deletion of ServiceAccounts that pods still use.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Resolves configuration from flags and `SDW_*` environment variables
//! - Starts the health server and the TLS webhook server
//! - Shuts down gracefully on SIGTERM or SIGINT

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use sa_delete_webhook::{
    Cli, ClusterClient, HealthState, ServerConfig, WebhookState, run_health_server,
    run_webhook_server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sa_delete_webhook=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();

    info!("Initializing SA Delete Webhook Server");

    // kube and axum-server both link rustls; pick one provider for the process
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A rustls crypto provider was already installed");
    }

    let config = ServerConfig::from(Cli::parse());
    info!(
        port = config.addr.port(),
        cert_file = %config.cert_path.display(),
        key_file = %config.key_path.display(),
        check_timeout = ?config.check_timeout,
        "Resolved configuration"
    );

    let health_state = Arc::new(HealthState::new());

    // Probes should answer even while the webhook listener is starting
    let health_handle = {
        let health_state = health_state.clone();
        let addr = config.health_addr;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, addr).await {
                error!("Health server error: {}", e);
            }
        })
    };

    // The Kubernetes client is built on the first admission request
    let cluster = Arc::new(ClusterClient::in_cluster());
    let state = Arc::new(WebhookState::new(
        cluster,
        config.check_timeout,
        health_state,
    ));

    info!("Starting the webhook server...");
    let result = run_webhook_server(&config, state, shutdown_signal()).await;
    health_handle.abort();

    match result {
        Ok(()) => {
            info!("Webhook server shut down cleanly.");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Webhook server exited with error");
            Err(e.into())
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the webhook cannot shut down
/// gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
