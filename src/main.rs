//! nf-admission - admission webhook for 5G network-function workloads.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Loads configuration from the environment
//! - Creates the Kubernetes client for namespace lookups
//! - Starts the health server and the TLS webhook server

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use tokio::signal;
use tokio::task::JoinError;
use tracing::{error, info};

use nf_admission::health::{HealthState, run_health_server};
use nf_admission::{Config, DecisionEngine, KubeNamespaceLookup, run_webhook_server};

/// Grace period for in-flight admission requests during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 2;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nf_admission=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();

    info!("Starting nf-admission");

    let config = Arc::new(Config::from_env()?);
    info!(
        data_plane_cidr = %config.data_plane_cidr,
        registries = ?config.allowed_registries,
        deny_latest_tag = config.deny_latest_tag,
        project_namespace = %config.project.namespace,
        "Configuration loaded"
    );

    let server = config.server.clone();
    for path in [&server.tls_cert_path, &server.tls_key_path] {
        if !Path::new(path).exists() {
            error!(path = %path, "Webhook TLS file not found");
            return Err(format!("webhook TLS file not found: {path}").into());
        }
    }

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let health_state = Arc::new(HealthState::new());

    // Probes answer before the webhook listener is up
    let health_handle = tokio::spawn(run_health_server(
        health_state.clone(),
        server.health_port,
    ));

    let engine = Arc::new(
        DecisionEngine::new(KubeNamespaceLookup::new(client), config)
            .with_health(health_state.clone()),
    );
    let webhook_handle = tokio::spawn(async move { run_webhook_server(engine, &server).await });

    tokio::select! {
        result = webhook_handle => return Err(server_exit("webhook", result)),
        result = health_handle => return Err(server_exit("health", result)),
        signal = shutdown_signal() => {
            if let Err(e) = signal {
                error!(error = %e, "Cannot listen for shutdown signals");
                return Err(e.into());
            }
            info!("Received shutdown signal, draining");

            health_state.set_ready(false).await;
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;
        }
    }

    info!("nf-admission stopped");
    Ok(())
}

/// Both servers run until shutdown, so any return from their task is fatal
/// and becomes the process error.
fn server_exit<E>(server: &str, result: Result<Result<(), E>, JoinError>) -> Box<dyn Error>
where
    E: Error + 'static,
{
    match result {
        Ok(Ok(())) => {
            error!(server, "Server exited unexpectedly");
            format!("{server} server exited").into()
        }
        Ok(Err(e)) => {
            error!(server, error = %e, "Server failed");
            Box::new(e)
        }
        Err(e) => {
            error!(server, error = %e, "Server task panicked");
            Box::new(e)
        }
    }
}

/// Resolves on SIGINT or SIGTERM; errors if a handler cannot be installed.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await
    }
}
