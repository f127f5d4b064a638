//! `crawldeck-panel` -- headless task panel for the crawl job runner.
//!
//! Loads the runner's task list, keeps running tasks fresh by polling and,
//! when `CRAWLDECK_WS_URL` is set, merges reports pushed over the realtime
//! channel. See [`PanelConfig::from_env`] for the environment variables.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crawldeck_channel::channel::RealtimeChannel;
use crawldeck_gateway::api::HttpJobGateway;
use crawldeck_panel::config::{LogFormat, PanelConfig};
use crawldeck_panel::poller::TaskPoller;
use crawldeck_panel::push;
use crawldeck_registry::registry::TaskRegistry;

const DEFAULT_LOG_FILTER: &str =
    "crawldeck_panel=info,crawldeck_registry=info,crawldeck_gateway=info,crawldeck_channel=info";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = PanelConfig::from_env();
    let log_format = config
        .as_ref()
        .map(|c| c.log_format)
        .unwrap_or_default();
    init_tracing(log_format);

    let config = config.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });
    tracing::info!(
        api_url = %config.api_url,
        database = %config.database,
        poll_interval_secs = config.poll_interval.as_secs(),
        ws_url = ?config.ws_url,
        "Starting crawldeck-panel",
    );

    let gateway = HttpJobGateway::new(&config.gateway_config()).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build job gateway");
        std::process::exit(1);
    });
    let registry =
        Arc::new(TaskRegistry::new(Arc::new(gateway)).with_database(config.database.clone()));

    let status = registry.refresh_system_status().await;
    tracing::info!(status = %status.status, message = %status.message, "Runner status");

    if let Some(count) = registry.list_all().await {
        let stats = registry.stats().await;
        tracing::info!(
            count,
            running = stats.running,
            completed = stats.completed,
            failed = stats.failed,
            "Tasks loaded",
        );
    }

    // --- Realtime channel ---
    let channel = config.ws_url.as_ref().map(|url| {
        let channel = RealtimeChannel::with_config(url.clone(), config.reconnect);
        push::log_lifecycle(&channel);
        let forwarder = push::forward_reports(&channel, Arc::clone(&registry));
        channel.connect();
        (channel, forwarder)
    });

    // --- Poller ---
    let cancel = CancellationToken::new();
    let poller = TaskPoller::new(Arc::clone(&registry), config.poll_interval);
    let poller_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { poller.run(cancel).await })
    };

    shutdown_signal().await;

    cancel.cancel();
    match tokio::time::timeout(Duration::from_secs(5), poller_handle).await {
        Ok(Ok(cycles)) => tracing::info!(cycles, "Poller stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Poller task failed"),
        Err(_) => tracing::warn!("Poller did not stop in time"),
    }

    if let Some((channel, forwarder)) = channel {
        channel.disconnect();
        let _ = tokio::time::timeout(Duration::from_secs(5), forwarder).await;
        tracing::info!("Realtime channel closed");
    }

    tracing::info!("Shutdown complete");
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
