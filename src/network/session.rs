//! Arena Session
//!
//! Binds transient WebSocket connections to players in the single shared
//! [`World`]. Every inbound message, disconnect, debug request and tick runs
//! as one call on [`ArenaSession`] while the caller holds the session's write
//! lock, so no two operations ever interleave.
//!
//! The session never touches a socket. Each connection is represented by an
//! `mpsc` sender of [`Outbound`] items drained by the connection's writer
//! task, which keeps the whole type testable without a network stack.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::combat::{self, DamageOutcome};
use crate::game::events::GameEvent;
use crate::game::map::MapRegistry;
use crate::game::pickup;
use crate::game::round;
use crate::game::state::{sanitize_name, ActionError, PlayerId, World, MAX_HP};
use crate::game::tick::{self, MatchConfig};
use crate::network::protocol::{ClientMessage, ServerMessage, StateSnapshot};
use crate::network::snapshot::{self, SnapshotStore};

/// Longest client token kept, in characters.
pub const MAX_CLIENT_TOKEN_LEN: usize = 64;

/// Unique connection identifier.
pub type ConnectionId = Uuid;

/// Session shared between the server loops and the debug surface.
pub type SharedSession = Arc<RwLock<ArenaSession>>;

/// Items queued for a connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Serialize and send as a text frame.
    Message(ServerMessage),
    /// Liveness probe (WebSocket ping frame).
    Probe,
    /// Send a close frame and stop writing.
    Close,
}

/// One live transport connection.
#[derive(Debug)]
struct Connection {
    sender: mpsc::Sender<Outbound>,
    player: Option<PlayerId>,
    last_message_at: u64,
    /// Cleared when a probe goes out, set again by the pong
    alive: bool,
}

/// Teleport request from the debug surface. Unset fields keep their value.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Teleport {
    pub id: PlayerId,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
    pub yaw: Option<f32>,
    pub pitch: Option<f32>,
    pub hp: Option<f32>,
}

/// The arena: one world plus the connections playing in it.
pub struct ArenaSession {
    world: World,
    build: String,
    connections: BTreeMap<ConnectionId, Connection>,
    /// Live binding of player to connection
    bindings: BTreeMap<PlayerId, ConnectionId>,
    /// Client token to the player it last identified
    tokens: HashMap<String, PlayerId>,
    snapshots: Option<SnapshotStore>,
}

impl ArenaSession {
    /// Create a session around a fresh world.
    pub fn new(config: MatchConfig, maps: Arc<MapRegistry>, seed: u64) -> Self {
        Self {
            world: World::new(config, maps, seed),
            build: crate::VERSION.to_string(),
            connections: BTreeMap::new(),
            bindings: BTreeMap::new(),
            tokens: HashMap::new(),
            snapshots: None,
        }
    }

    /// Enable screenshot uploads into `store`.
    pub fn with_snapshots(mut self, store: SnapshotStore) -> Self {
        self.snapshots = Some(store);
        self
    }

    /// Wrap for sharing across tasks.
    pub fn shared(self) -> SharedSession {
        Arc::new(RwLock::new(self))
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Player bound to `conn`, if it has joined.
    pub fn player_of(&self, conn: ConnectionId) -> Option<PlayerId> {
        self.connections.get(&conn).and_then(|c| c.player)
    }

    /// Connection currently bound to `player`.
    pub fn connection_of(&self, player: PlayerId) -> Option<ConnectionId> {
        self.bindings.get(&player).copied()
    }

    // =========================================================================
    // CONNECTION LIFECYCLE
    // =========================================================================

    /// Register a new transport connection. It has no player until it joins.
    pub fn connect(&mut self, sender: mpsc::Sender<Outbound>, now: u64) -> ConnectionId {
        let id = Uuid::new_v4();
        self.connections.insert(
            id,
            Connection { sender, player: None, last_message_at: now, alive: true },
        );
        debug!(conn = %id, total = self.connections.len(), "connection registered");
        id
    }

    /// Transport closed, cleanly or not. The player stays in the world until
    /// its grace window runs out.
    pub fn disconnect(&mut self, conn: ConnectionId, now: u64) {
        let Some(connection) = self.connections.remove(&conn) else {
            return;
        };
        let Some(player) = connection.player else {
            return;
        };
        if self.bindings.get(&player) != Some(&conn) {
            return;
        }
        self.bindings.remove(&player);
        if let Some(p) = self.world.get_player_mut(player) {
            p.disconnected_at = Some(now);
            info!(player = %player, name = %p.name, "player disconnected");
        }
        self.broadcast_state(now);
    }

    /// Record a pong from `conn`.
    pub fn note_pong(&mut self, conn: ConnectionId, now: u64) {
        if let Some(c) = self.connections.get_mut(&conn) {
            c.alive = true;
            c.last_message_at = now;
        }
    }

    /// Record any inbound frame from `conn`, parseable or not.
    pub fn note_activity(&mut self, conn: ConnectionId, now: u64) {
        if let Some(c) = self.connections.get_mut(&conn) {
            c.last_message_at = now;
        }
    }

    /// Close every connection that missed the last probe or has been silent
    /// longer than `idle_ms`, then probe the rest. Returns the closed ids.
    pub fn sweep_liveness(&mut self, now: u64, idle_ms: u64) -> Vec<ConnectionId> {
        let stale: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(_, c)| !c.alive || now.saturating_sub(c.last_message_at) > idle_ms)
            .map(|(id, _)| *id)
            .collect();

        for conn in &stale {
            warn!(conn = %conn, "connection failed liveness check");
            if let Some(c) = self.connections.get(conn) {
                let _ = c.sender.try_send(Outbound::Close);
            }
            self.disconnect(*conn, now);
        }

        for c in self.connections.values_mut() {
            c.alive = false;
            let _ = c.sender.try_send(Outbound::Probe);
        }
        stale
    }

    // =========================================================================
    // MESSAGE DISPATCH
    // =========================================================================

    /// Apply one parsed client message. Rejected actions are logged and
    /// dropped; they never close the connection.
    pub fn handle_message(&mut self, conn: ConnectionId, msg: ClientMessage, now: u64) {
        let Some(connection) = self.connections.get_mut(&conn) else {
            return;
        };
        connection.last_message_at = now;
        let player = connection.player;

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(conn = %conn, ?player, ?msg, "client message");

        let result = match (msg, player) {
            (ClientMessage::Join { name, client_id }, _) => {
                self.join(conn, name.as_deref().unwrap_or_default(), client_id.as_deref(), now);
                Ok(())
            }
            (ClientMessage::Ping, _) => Ok(()),
            (_, None) => {
                debug!(conn = %conn, "message before join ignored");
                Ok(())
            }
            (ClientMessage::Input(input), Some(id)) => {
                tick::handle_input(&mut self.world, id, &input.to_player_input(), now)
            }
            (ClientMessage::Start, Some(_)) => round::start_round(&mut self.world, now),
            (ClientMessage::SetMap { map_id }, Some(_)) => round::set_map(&mut self.world, &map_id, now),
            (ClientMessage::Reload, Some(id)) => tick::start_reload(&mut self.world, id, now),
            (ClientMessage::Pickup { id: pickup_id }, Some(id)) => {
                pickup::try_pickup(&mut self.world, id, &pickup_id, now)
            }
            (ClientMessage::DropMinigun, Some(id)) => pickup::drop_power_weapon(&mut self.world, id, now),
            (ClientMessage::Snap { data_url }, Some(id)) => {
                self.save_snapshot(conn, id, &data_url, now);
                Ok(())
            }
            (ClientMessage::ResetLobby, Some(id)) => self.reset_lobby(conn, id, now),
        };

        if let Err(e) = result {
            debug!(player = ?player, error = %e, "action rejected");
        }
        self.flush(now);
    }

    /// Join as a new player, or reattach the player a known token names.
    pub fn join(&mut self, conn: ConnectionId, name: &str, client_token: Option<&str>, now: u64) -> Option<PlayerId> {
        if let Some(existing) = self.player_of(conn) {
            debug!(conn = %conn, player = %existing, "duplicate join ignored");
            return Some(existing);
        }
        if !self.connections.contains_key(&conn) {
            return None;
        }

        let token: Option<String> = client_token
            .map(|t| t.trim().chars().take(MAX_CLIENT_TOKEN_LEN).collect::<String>())
            .filter(|t| !t.is_empty());
        let known = token
            .as_ref()
            .and_then(|t| self.tokens.get(t))
            .copied()
            .filter(|id| self.world.get_player(*id).is_some());

        let id = match known {
            Some(id) => {
                if let Some(old) = self.bindings.get(&id).copied().filter(|old| *old != conn) {
                    info!(player = %id, old = %old, "closing superseded connection");
                    self.close(old);
                }
                if let Some(p) = self.world.get_player_mut(id) {
                    p.disconnected_at = None;
                    p.last_input_at = now;
                    if !name.trim().is_empty() {
                        p.name = sanitize_name(name);
                    }
                }
                if self.world.round.host.is_none() {
                    self.world.round.host = Some(id);
                }
                info!(player = %id, "player reattached");
                id
            }
            None => {
                let id = self.world.add_player(name, now);
                if let Some(t) = token {
                    self.tokens.insert(t, id);
                }
                info!(player = %id, name = %self.world.get_player(id).map_or("", |p| p.name.as_str()), "player joined");
                id
            }
        };

        self.bindings.insert(id, conn);
        if let Some(c) = self.connections.get_mut(&conn) {
            c.player = Some(id);
        }

        let welcome = ServerMessage::Welcome {
            id,
            state: self.snapshot(now),
            world: self.world.active_map().clone(),
        };
        self.send_to(conn, welcome);
        self.broadcast_state(now);
        Some(id)
    }

    /// Host-only reset. Every connection but the requester's is closed,
    /// joined or not.
    fn reset_lobby(&mut self, conn: ConnectionId, requester: PlayerId, now: u64) -> Result<(), ActionError> {
        let removed = round::reset_lobby(&mut self.world, requester, now)?;
        for id in removed {
            self.forget_player(id);
        }
        let others: Vec<ConnectionId> = self.connections.keys().filter(|c| **c != conn).copied().collect();
        for other in others {
            self.close(other);
        }
        Ok(())
    }

    fn save_snapshot(&mut self, conn: ConnectionId, player: PlayerId, data_url: &str, now: u64) {
        let Some(store) = &self.snapshots else {
            debug!(player = %player, "snapshot uploads disabled");
            return;
        };
        let Some(reply) = self.connections.get(&conn).map(|c| c.sender.clone()) else {
            return;
        };
        match snapshot::parse_data_url(data_url) {
            Ok(image) => store.save(image, player, now, reply),
            Err(e) => debug!(player = %player, error = %e, "snapshot rejected"),
        }
    }

    // =========================================================================
    // TICK
    // =========================================================================

    /// Advance the simulation and broadcast its events and a fresh snapshot.
    pub fn tick(&mut self, now: u64) {
        let result = tick::tick(&mut self.world, now);
        for id in &result.removed {
            info!(player = %id, "player removed");
            self.forget_player(*id);
        }
        self.dispatch(result.events);
        self.broadcast_state(now);
    }

    // =========================================================================
    // DEBUG OPERATIONS
    // =========================================================================

    /// Force the round into Active.
    pub fn debug_start(&mut self, now: u64) {
        round::force_start(&mut self.world, now);
        self.flush(now);
    }

    /// Move a player and optionally set its look and health.
    pub fn debug_teleport(&mut self, req: &Teleport, now: u64) -> Result<(), ActionError> {
        let p = self.world.player_mut(req.id)?;
        if let Some(x) = req.x.filter(|v| v.is_finite()) {
            p.position.x = x;
        }
        if let Some(y) = req.y.filter(|v| v.is_finite()) {
            p.position.y = y;
        }
        if let Some(z) = req.z.filter(|v| v.is_finite()) {
            p.position.z = z;
        }
        if let Some(yaw) = req.yaw.filter(|v| v.is_finite()) {
            p.yaw = yaw;
        }
        if let Some(pitch) = req.pitch.filter(|v| v.is_finite()) {
            p.pitch = pitch;
        }
        if let Some(hp) = req.hp.filter(|v| v.is_finite()) {
            p.hp = (hp.round() as i32).clamp(0, MAX_HP);
        }
        self.world.push_event(GameEvent::StateChanged);
        self.flush(now);
        Ok(())
    }

    /// One rifle shot from `shooter` ignoring cooldown and ammo.
    pub fn debug_shoot(&mut self, shooter: PlayerId, now: u64) -> Result<DamageOutcome, ActionError> {
        let outcome = combat::debug_shot(&mut self.world, shooter, now);
        self.flush(now);
        outcome
    }

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    /// Full snapshot of the world at `now`.
    pub fn snapshot(&self, now: u64) -> StateSnapshot {
        StateSnapshot::capture(&self.world, &self.build, now)
    }

    /// Send `msg` to every connection.
    pub fn broadcast(&self, msg: &ServerMessage) {
        for (id, c) in &self.connections {
            if c.sender.try_send(Outbound::Message(msg.clone())).is_err() {
                debug!(conn = %id, "outbound queue full or closed, message dropped");
            }
        }
    }

    fn broadcast_state(&self, now: u64) {
        self.broadcast(&ServerMessage::State { state: self.snapshot(now) });
    }

    fn send_to(&self, conn: ConnectionId, msg: ServerMessage) {
        if let Some(c) = self.connections.get(&conn) {
            if c.sender.try_send(Outbound::Message(msg)).is_err() {
                debug!(conn = %conn, "outbound queue full or closed, message dropped");
            }
        }
    }

    /// Drain pending world events to every connection.
    fn flush(&mut self, now: u64) {
        let events = self.world.take_events();
        if self.dispatch(events) {
            self.broadcast_state(now);
        }
    }

    /// Broadcast `events`. Returns true if any asked for a state refresh.
    fn dispatch(&self, events: Vec<GameEvent>) -> bool {
        let mut state_changed = false;
        for event in &events {
            if matches!(event, GameEvent::StateChanged) {
                state_changed = true;
                continue;
            }
            debug!(player = ?event.player(), event = ?event, "game event");
            for msg in ServerMessage::from_event(event) {
                self.broadcast(&msg);
            }
        }
        state_changed
    }

    /// Tell the writer for `conn` to close, and drop the connection.
    fn close(&mut self, conn: ConnectionId) {
        if let Some(c) = self.connections.remove(&conn) {
            let _ = c.sender.try_send(Outbound::Close);
            if let Some(player) = c.player {
                if self.bindings.get(&player) == Some(&conn) {
                    self.bindings.remove(&player);
                }
            }
        }
    }

    /// A player left the world: close its connection and drop its tokens.
    fn forget_player(&mut self, id: PlayerId) {
        if let Some(conn) = self.bindings.remove(&id) {
            if let Some(c) = self.connections.remove(&conn) {
                let _ = c.sender.try_send(Outbound::Close);
            }
        }
        self.tokens.retain(|_, player| *player != id);
    }
}
