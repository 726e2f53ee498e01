use anyhow::Context;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use stresslab::config::Config;
use stresslab::probe::ProbeSet;
use stresslab::server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config =
        Config::from_env().context("failed to parse configuration from environment variables")?;
    config.validate().context("invalid configuration")?;

    let default_level = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("starting stresslab");
    if config.debug {
        debug!("debug log level enabled");
        config.log();
    }

    let probes = ProbeSet::new(
        config.probes.startup.clone(),
        config.probes.liveness.clone(),
        config.probes.readiness.clone(),
    );
    let state = AppState::new(probes);

    let listener = tokio::net::TcpListener::bind(&config.listen_on)
        .await
        .with_context(|| format!("failed to listen on {}", config.listen_on))?;
    info!("server is now listening on: {}", config.listen_on);

    axum::serve(listener, router(state))
        .await
        .context("HTTP server failed")?;
    info!("stresslab stopped");
    Ok(())
}
