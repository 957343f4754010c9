// ABOUTME: Daemon setup and lifecycle.
// ABOUTME: Boots the supervisor, serves the control socket and HTTP API, and stops services on shutdown.

use crate::api::{self, ApiState};
use crate::boot;
use crate::socket::{self, ControlState};
use anyhow::{Context, Result};
use eternal_core::{Paths, SystemConfig};
use eternal_supervisor::{Supervisor, SupervisorOptions};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run the daemon until Ctrl+C or SIGTERM
pub async fn run(paths: Paths) -> Result<()> {
    run_until(paths, shutdown_signal()).await
}

/// Run the daemon until `shutdown` resolves
pub async fn run_until(paths: Paths, shutdown: impl Future<Output = ()>) -> Result<()> {
    info!("Starting eternal daemon");
    info!("  State directory: {}", paths.base.display());

    paths.ensure().context("creating state directory")?;
    let config = SystemConfig::load_or_generate(&paths.config_file)
        .context("loading system config")?;

    let supervisor = Supervisor::new(SupervisorOptions {
        launch_timeout: config.launch_timeout(),
        stop_timeout: config.stop_timeout(),
    });

    let report = boot::boot(&supervisor, &paths)
        .await
        .context("loading service definitions")?;
    info!(
        registered = report.registered,
        started = report.started.len(),
        failed = report.failed.len(),
        "Boot complete"
    );

    let cancel = CancellationToken::new();

    // Control socket
    let listener = socket::bind(&config.socket_path)?;
    let control_state = Arc::new(ControlState {
        supervisor: supervisor.clone(),
        paths: paths.clone(),
    });
    let socket_task = tokio::spawn(socket::serve(
        listener,
        config.socket_path.clone(),
        control_state,
        cancel.clone(),
    ));

    // HTTP API
    let addr = config.api_addr();
    let tcp = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding HTTP API on {addr}"))?;
    let local_addr = tcp.local_addr().context("reading HTTP API address")?;
    let api_state = Arc::new(ApiState {
        supervisor: supervisor.clone(),
        paths: paths.clone(),
        token: config.token.clone(),
        settle_timeout: config.stop_timeout(),
    });
    let api_cancel = cancel.clone();
    let api_task = tokio::spawn(async move {
        axum::serve(tcp, api::router(api_state))
            .with_graceful_shutdown(async move { api_cancel.cancelled().await })
            .await
    });

    info!("HTTP API listening on {}", local_addr);
    info!("  API token stored in {}", paths.config_file.display());

    shutdown.await;
    cancel.cancel();

    match socket_task.await {
        Ok(Err(e)) => tracing::warn!(error = %e, "Control socket stopped with error"),
        Err(e) => tracing::warn!(error = %e, "Control socket task panicked"),
        Ok(Ok(())) => {}
    }
    match api_task.await {
        Ok(Err(e)) => tracing::warn!(error = %e, "HTTP API stopped with error"),
        Err(e) => tracing::warn!(error = %e, "HTTP API task panicked"),
        Ok(Ok(())) => {}
    }

    info!("Stopping services");
    supervisor.shutdown(config.stop_timeout()).await;

    info!("Daemon shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
