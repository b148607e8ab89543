//! WebSocket Game Server
//!
//! Async WebSocket server for the arena. One task per connection reads
//! frames and feeds them into the shared [`ArenaSession`]; a writer task per
//! connection drains its outbound queue. Background tasks run the fixed-rate
//! tick, the liveness sweep and the loopback debug surface.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::map::MapRegistry;
use crate::game::tick::MatchConfig;
use crate::network::debug;
use crate::network::protocol::ClientMessage;
use crate::network::session::{ArenaSession, Outbound, SharedSession};
use crate::network::snapshot::SnapshotStore;

/// Outbound queue depth per connection.
const OUTBOUND_QUEUE: usize = 256;

/// Current wall clock in unix milliseconds. This is the simulation clock.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket bind address.
    pub bind_addr: SocketAddr,
    /// Debug HTTP bind address (loopback).
    pub debug_addr: SocketAddr,
    /// Where uploaded screenshots land.
    pub snapshot_dir: PathBuf,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Tick rate for the simulation (Hz).
    pub tick_rate: u32,
    /// How often connections are probed.
    pub liveness_interval: Duration,
    /// Close connections silent for longer than this.
    pub idle_timeout: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 3000),
            debug_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3001),
            snapshot_dir: PathBuf::from("snapshots"),
            max_connections: 64,
            tick_rate: crate::TICK_RATE,
            liveness_interval: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(120),
            version: crate::VERSION.to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults.
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(ip) = env_parse::<IpAddr>("BIND_ADDRESS") {
            config.bind_addr.set_ip(ip);
        }

        if let Some(port) = env_parse::<u16>("PORT") {
            if port > 0 {
                config.bind_addr.set_port(port);
            } else {
                warn!("PORT must be > 0, using default");
            }
        }

        if let Some(port) = env_parse::<u16>("DEBUG_PORT") {
            if port > 0 {
                config.debug_addr.set_port(port);
            } else {
                warn!("DEBUG_PORT must be > 0, using default");
            }
        }

        if let Ok(dir) = std::env::var("SNAPSHOT_DIR") {
            if !dir.trim().is_empty() {
                config.snapshot_dir = PathBuf::from(dir);
            }
        }

        if let Some(rate) = env_parse::<u32>("TICK_RATE") {
            if (1..=120).contains(&rate) {
                config.tick_rate = rate;
            } else {
                warn!("TICK_RATE must be 1-120, using default");
            }
        }

        if let Some(max) = env_parse::<usize>("MAX_CONNECTIONS") {
            if max > 0 {
                config.max_connections = max;
            } else {
                warn!("MAX_CONNECTIONS must be > 0, using default");
            }
        }

        config
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> Result<(), GameServerError> {
        let invalid = |msg: &str| Err(GameServerError::Config(msg.to_string()));
        if self.bind_addr.port() == 0 {
            return invalid("port cannot be 0");
        }
        if self.debug_addr.port() == self.bind_addr.port() && self.debug_addr.ip() == self.bind_addr.ip() {
            return invalid("debug port must differ from the game port");
        }
        if !self.debug_addr.ip().is_loopback() {
            return invalid("debug endpoints must bind a loopback address");
        }
        if self.max_connections == 0 {
            return invalid("max_connections must be at least 1");
        }
        if self.tick_rate == 0 {
            return invalid("tick_rate must be at least 1");
        }
        if self.idle_timeout <= self.liveness_interval {
            return invalid("idle_timeout must exceed liveness_interval");
        }
        Ok(())
    }

    fn tick_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.tick_rate.max(1)))
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[source] std::io::Error),

    /// IO error after startup.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

// =============================================================================
// SERVER
// =============================================================================

/// The game server.
pub struct GameServer {
    config: ServerConfig,
    session: SharedSession,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server around a fresh arena.
    pub fn new(config: ServerConfig, match_config: MatchConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let match_config = MatchConfig { tick_rate: config.tick_rate, ..match_config };
        let session = ArenaSession::new(match_config, Arc::new(MapRegistry::builtin()), now_ms())
            .with_snapshots(SnapshotStore::new(&config.snapshot_dir))
            .shared();

        Self { config, session, shutdown_tx }
    }

    /// Shared session handle.
    pub fn session(&self) -> SharedSession {
        self.session.clone()
    }

    /// Run the server until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(GameServerError::BindFailed)?;
        info!("Game server listening on {}", self.config.bind_addr);

        let tick_handle = tokio::spawn(Self::run_tick_loop(self.session.clone(), self.config.tick_interval()));
        let liveness_handle = tokio::spawn(Self::run_liveness_loop(
            self.session.clone(),
            self.config.liveness_interval,
            self.config.idle_timeout,
        ));

        let debug_addr = self.config.debug_addr;
        let debug_session = self.session.clone();
        let debug_shutdown = self.shutdown_tx.subscribe();
        let debug_handle = tokio::spawn(async move {
            if let Err(e) = debug::serve(debug_addr, debug_session, debug_shutdown).await {
                error!("Debug server error: {}", e);
            }
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let count = self.session.read().await.connection_count();
                            if count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        tick_handle.abort();
        liveness_handle.abort();
        let _ = debug_handle.await;

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let session = self.session.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(OUTBOUND_QUEUE);
            let conn = session.write().await.connect(out_tx, now_ms());

            // Writer: stops on Close or when the socket fails
            let mut sender_task = tokio::spawn(async move {
                while let Some(item) = out_rx.recv().await {
                    let frame = match item {
                        Outbound::Message(msg) => match msg.to_json() {
                            Ok(text) => Message::Text(text),
                            Err(e) => {
                                error!("Failed to serialize message: {}", e);
                                continue;
                            }
                        },
                        Outbound::Probe => Message::Ping(Vec::new()),
                        Outbound::Close => {
                            let _ = ws_sender.send(Message::Close(None)).await;
                            break;
                        }
                    };
                    if ws_sender.send(frame).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        session.write().await.note_activity(conn, now_ms());
                                        continue;
                                    }
                                };
                                session.write().await.handle_message(conn, client_msg, now_ms());
                            }
                            Some(Ok(Message::Pong(_))) => {
                                session.write().await.note_pong(conn, now_ms());
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            Some(Ok(_)) => {
                                session.write().await.note_activity(conn, now_ms());
                            }
                        }
                    }
                    _ = &mut sender_task => {
                        debug!("Writer for {} finished", addr);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            sender_task.abort();
            session.write().await.disconnect(conn, now_ms());
            info!("Client {} cleaned up", addr);
        });
    }

    /// Fixed-rate simulation tick.
    async fn run_tick_loop(session: SharedSession, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            session.write().await.tick(now_ms());
        }
    }

    /// Periodic liveness probe.
    async fn run_liveness_loop(session: SharedSession, period: Duration, idle: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let idle_ms = idle.as_millis() as u64;
        loop {
            ticker.tick().await;
            let closed = session.write().await.sweep_liveness(now_ms(), idle_ms);
            if !closed.is_empty() {
                info!(closed = closed.len(), "liveness sweep closed connections");
            }
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Active connection count.
    pub async fn connection_count(&self) -> usize {
        self.session.read().await.connection_count()
    }
}
