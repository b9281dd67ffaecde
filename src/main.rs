use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use marble_arena_server::config::{ArenaConfig, ServerConfig};
use marble_arena_server::metrics::{self, Metrics};
use marble_arena_server::net::game_session::{start_game_loop, GameSession};
use marble_arena_server::net::transport::WebTransportServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging (RUST_LOG overrides)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Marble Arena Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ServerConfig::load_or_default();
    config
        .validate()
        .map_err(|e| anyhow!(e))
        .context("Invalid server configuration")?;
    info!(
        "Configuration loaded: {}:{}, {} Hz, max_displays={}",
        config.bind_address, config.port, config.tick_rate, config.max_displays
    );

    let arena = ArenaConfig::load_or_default();
    arena
        .validate()
        .map_err(|e| anyhow!(e))
        .context("Invalid arena configuration")?;
    info!(
        "Arena: {:?}, budget {}, threshold {:?}, end {:?}, seed {}",
        arena.variant, arena.marble_budget, arena.win_threshold, arena.end_condition, arena.seed
    );

    let metrics = Arc::new(Metrics::new());

    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    // The simulation loop owns the engine; everything else talks to it via the handle
    let (session, handle) = GameSession::new(arena, config.max_displays, metrics.clone());
    let game_loop = start_game_loop(session, config.tick_rate);

    let server = WebTransportServer::new(config.clone(), handle, metrics.clone()).await?;

    info!("Server ready on https://{}", server.bind_addr());
    info!(
        "Chrome flag: --ignore-certificate-errors-spki-list={}",
        server.cert_hash()
    );

    // Shutdown signal handler
    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {:#}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    game_loop.abort();
    info!("Server stopped");

    Ok(())
}
