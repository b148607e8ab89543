//! Hunter Boyz Game Server
//!
//! Authoritative arena shooter server.

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hunter_boyz::{
    game::map::MapRegistry,
    network::{GameServer, ServerConfig},
    MatchConfig, TICK_RATE, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Hunter Boyz Server v{}", VERSION);

    let config = ServerConfig::load_or_default();
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return Err(e.into());
    }

    let match_config = MatchConfig::default();
    info!(
        "Configuration loaded: ws={} debug={} snapshots={} tick_rate={} (default {})",
        config.bind_addr,
        config.debug_addr,
        config.snapshot_dir.display(),
        config.tick_rate,
        TICK_RATE,
    );
    info!(
        "Match: win score {}, round {}s, maps [{}]",
        match_config.win_score,
        match_config.round_duration_ms / 1000,
        MapRegistry::builtin().ids().collect::<Vec<_>>().join(", "),
    );

    let server = GameServer::new(config, match_config);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!("Server error: {}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            server.shutdown();
        }
    }

    Ok(())
}
