//! kubepulse - live cluster state streaming server
//!
//! Polls the cluster every few seconds and streams each snapshot to every
//! connected WebSocket viewer.

use std::sync::Arc;

use anyhow::Context;
use pulse_server::cli::{Cli, LogFormat};
use pulse_server::{
    ClusterInspector, ClusterPoller, FileInspector, HostInspector, PulseServer, SubscriberRegistry,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_with_legacy_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }

    let config = cli.server_config();
    let inspector: Arc<dyn ClusterInspector> = match &cli.state_file {
        Some(path) => Arc::new(FileInspector::new(path)),
        None => Arc::new(HostInspector::new()),
    };

    info!(
        addr = %config.bind_addr,
        inspector = inspector.name(),
        poll_interval = ?config.poll_interval,
        "starting kubepulse"
    );
    info!("  Stream endpoint: ws://{}{}", config.bind_addr, config.stream_path);
    info!("  Health endpoint: http://{}{}", config.bind_addr, config.health_path);

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let registry = SubscriberRegistry::new();
    let poller = ClusterPoller::new(Arc::clone(&inspector), registry.clone(), config.poll_interval)
        .with_failure_warn_threshold(config.failure_warn_threshold)
        .spawn(shutdown.clone());

    let server = PulseServer::new(config.clone(), registry, inspector);
    let result = server.start(config.bind_addr, shutdown.clone()).await;

    // Stop the poller whichever way the server ended.
    shutdown.cancel();
    if let Err(e) = poller.await {
        error!(error = %e, "cluster poller task failed");
    }

    result.with_context(|| format!("server on {} failed", config.bind_addr))?;
    info!("kubepulse stopped");
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
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
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received interrupt"),
        () = terminate => info!("received terminate"),
    }

    shutdown.cancel();
}
