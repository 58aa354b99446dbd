mod app;
mod audit;
mod auth;
mod bootstrap;
mod error;
mod health;
mod menu;
mod notifications;
mod orders;
mod sla_monitor;
mod technicians;
mod tickets;

use std::time::Duration;

use anyhow::Result;
use helpdesk_core::config::{AppConfig, LoadOptions};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use helpdesk_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let monitor = sla_monitor::spawn(
        app.state.clone(),
        Duration::from_secs(app.config.sla.monitor_interval_secs),
        shutdown_rx.clone(),
    );

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        auto_assign = app.state.settings.auto_assign,
        "helpdesk-server listening"
    );

    let mut server_shutdown = shutdown_rx;
    let router = app::router(app.state.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    wait_for_shutdown().await?;
    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = app.config.server.graceful_shutdown_secs,
        "helpdesk-server stopping"
    );
    shutdown_tx.send_replace(true);

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => warn!(
            event_name = "system.server.grace_elapsed",
            correlation_id = "shutdown",
            "in-flight requests did not finish within the grace period"
        ),
    }
    if tokio::time::timeout(grace, monitor).await.is_err() {
        warn!(
            event_name = "sla.monitor.grace_elapsed",
            correlation_id = "shutdown",
            "SLA monitor did not stop within the grace period"
        );
    }

    app.db_pool.close().await;
    info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "helpdesk-server stopped"
    );
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
