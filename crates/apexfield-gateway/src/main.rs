//! Apexfield HTTP/JSON Gateway binary.

use apexfield_gateway::{create_router, AppState, Args, GatewayConfig};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Parse command line args
    let args = Args::parse();
    let config = GatewayConfig::from(&args);

    info!(
        listen = %config.listen_addr,
        fixture = ?config.fixture,
        rest_url = config.core.rest_url.as_deref().unwrap_or("-"),
        "Starting Apexfield Gateway"
    );

    let state = AppState::from_config(config.clone())
        .await
        .map_err(|e| anyhow::anyhow!("failed to initialise store: {e}"))?;
    info!(store = state.store_kind(), "Store ready");

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Gateway listening on {}", config.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
