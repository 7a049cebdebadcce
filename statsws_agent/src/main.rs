//! Entry point for statsws_agent. Parses config, starts sampling and serves websockets.

use anyhow::Context;
use clap::Parser;
use statsws_agent::{
    config::Config, provider::SysinfoProvider, registry::Registry, spawn_pipeline,
    state::AppState, ws,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let hostname = hostname::get()
        .ok()
        .and_then(|s| s.into_string().ok())
        .unwrap_or_else(|| "unknown".into());

    let registry = Registry::new(config.count, config.interval, config.queue_depth);
    let _pipeline = spawn_pipeline(
        Arc::new(SysinfoProvider::new()),
        config.period(),
        registry.clone(),
    );

    let bind = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(
        host = %hostname,
        addr = %listener.local_addr()?,
        count = %config.count,
        interval = config.interval,
        "statsws agent listening"
    );

    let app = ws::router(AppState::new(registry));
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server stopped")?;
    Ok(())
}
