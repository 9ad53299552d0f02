//! Fourline Game Server
//!
//! Authoritative server binary: pairs players over WebSocket and referees
//! their matches.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fourline::network::server::{GameServer, ServerConfig};
use fourline::VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    info!("Fourline Server v{}", VERSION);
    info!("Bind address: {}", config.bind_addr);
    info!(
        "Bot fallback after {:?}, bot move delay {:?}",
        config.bot_fallback, config.bot_move_delay
    );

    let server = GameServer::new(config);
    server.run().await.context("server terminated")?;

    Ok(())
}
