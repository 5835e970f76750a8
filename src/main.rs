use std::net::SocketAddr;

use anyhow::{Context, Result};
use storefront::{AppState, Config, init_router, open_store};
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    let store = open_store(&config).await?;
    let port = config.server_port;
    let state = AppState::from_config(config, store)?;

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let listener = TcpListener::bind(addr).await?;

    let app = init_router(state);

    tracing::info!("Listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
