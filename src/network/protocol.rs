//! Protocol Messages
//!
//! JSON wire format for client-server communication over WebSocket. Every
//! message is an object whose `t` field names its type. Inbound text is parsed
//! into [`ClientMessage`] at the transport boundary; anything that does not
//! match a known shape is rejected there.

use serde::{Deserialize, Serialize};

use crate::game::events::{GameEvent, HitPart, ShotEvent, Toast};
use crate::game::input::PlayerInput;
use crate::game::map::Map;
use crate::game::state::{PlayerId, World};
use crate::game::weapon::{PowerWeaponKind, WeaponKind};

/// Name shown when a death has no killer.
pub const NOBODY: &str = "—";

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "t", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join, or reattach when `client_id` names a retained player.
    Join {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        client_id: Option<String>,
    },

    /// Movement, look and trigger state for one client frame.
    Input(InputMessage),

    /// Start the round.
    Start,

    /// Select a map (lobby only).
    SetMap { map_id: String },

    /// Begin a manual reload.
    Reload,

    /// Claim a pad or drop.
    Pickup { id: String },

    /// Drop the carried minigun.
    DropMinigun,

    /// Upload a screenshot as a data URL.
    Snap { data_url: String },

    /// Host-only lobby reset.
    ResetLobby,

    /// Keepalive.
    Ping,
}

/// Horizontal move axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MoveAxes {
    pub x: f32,
    pub z: f32,
}

/// Absolute look angles. Missing values keep the current ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Look {
    pub yaw: Option<f32>,
    pub pitch: Option<f32>,
}

/// Body of an `input` message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InputMessage {
    pub seq: u64,
    pub dt: Option<f32>,
    #[serde(rename = "move")]
    pub movement: MoveAxes,
    pub look: Look,
    pub shoot: bool,
    pub jump: bool,
    pub sprint: bool,
    pub weapon: Option<String>,
    pub auto_reload: Option<bool>,
}

impl InputMessage {
    /// Convert to the simulation's input frame.
    pub fn to_player_input(&self) -> PlayerInput {
        PlayerInput {
            seq: self.seq,
            dt: self.dt,
            move_x: self.movement.x,
            move_z: self.movement.z,
            yaw: self.look.yaw,
            pitch: self.look.pitch,
            shoot: self.shoot,
            jump: self.jump,
            sprint: self.sprint,
            weapon: self.weapon.clone(),
            auto_reload: self.auto_reload,
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Full world snapshot sent every tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub ts: u64,
    pub build: String,
    pub game: GameInfo,
    pub pickups: Vec<PickupInfo>,
    pub players: Vec<PlayerInfo>,
}

/// Round metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    pub started: bool,
    pub phase: &'static str,
    pub host_id: Option<PlayerId>,
    pub round_ends_at: u64,
    pub map_id: String,
}

/// A pad or drop as clients see it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub weapon: PowerWeaponKind,
    /// "pad" or "drop"
    pub kind: &'static str,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub avail_in_ms: u64,
    pub held_by: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_ms: Option<u64>,
}

/// Public player fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub hp: i32,
    pub score: u32,
    pub deaths: u32,
    pub ammo: u32,
    pub power_weapon: Option<PowerWeaponKind>,
    pub power_ammo: u32,
    pub mg_spin: f32,
    pub mg_heat: f32,
    pub mg_overheat: bool,
    pub reload_in_ms: u64,
    pub invuln_in_ms: u64,
    pub respawn_in_ms: u64,
    pub connected: bool,
    pub fart_in_ms: u64,
    pub color: String,
}

fn remaining(deadline: u64, now: u64) -> u64 {
    deadline.saturating_sub(now)
}

impl StateSnapshot {
    /// Build the snapshot of `world` as seen at `now`.
    pub fn capture(world: &World, build: &str, now: u64) -> Self {
        let round = &world.round;
        let game = GameInfo {
            started: round.is_started(),
            phase: round.phase_name(),
            host_id: round.host,
            round_ends_at: round.ends_at,
            map_id: round.map_id.clone(),
        };

        let mut pickups: Vec<PickupInfo> = world
            .pads
            .iter()
            .map(|pad| PickupInfo {
                id: pad.id.clone(),
                weapon: pad.kind,
                kind: "pad",
                x: pad.position.x,
                y: pad.position.y,
                z: pad.position.z,
                avail_in_ms: remaining(pad.available_at, now),
                held_by: pad.held_by,
                expires_in_ms: None,
            })
            .collect();
        pickups.extend(world.drops.iter().map(|drop| PickupInfo {
            id: drop.id(),
            weapon: drop.kind,
            kind: "drop",
            x: drop.position.x,
            y: drop.position.y,
            z: drop.position.z,
            avail_in_ms: 0,
            held_by: None,
            expires_in_ms: Some(remaining(drop.expires_at, now)),
        }));

        let players = world
            .players
            .values()
            .map(|p| {
                let power = p.power.as_ref();
                PlayerInfo {
                    id: p.id,
                    name: p.name.clone(),
                    x: p.position.x,
                    y: p.position.y,
                    z: p.position.z,
                    yaw: p.yaw,
                    pitch: p.pitch,
                    hp: p.hp,
                    score: p.score,
                    deaths: p.deaths,
                    ammo: p.ammo,
                    power_weapon: power.map(|w| w.kind),
                    power_ammo: power.map_or(0, |w| w.ammo),
                    mg_spin: power.map_or(0.0, |w| w.spin),
                    mg_heat: power.map_or(0.0, |w| w.heat),
                    mg_overheat: power.is_some_and(|w| w.overheated),
                    reload_in_ms: p.reload_until.map_or(0, |t| remaining(t, now)),
                    invuln_in_ms: remaining(p.invuln_until, now),
                    respawn_in_ms: if p.is_alive() { 0 } else { p.respawn_at.map_or(0, |t| remaining(t, now)) },
                    connected: p.is_connected(),
                    fart_in_ms: p.status.map_or(0, |s| remaining(s.until, now)),
                    color: p.color.clone(),
                }
            })
            .collect();

        Self { ts: now, build: build.to_string(), game, pickups, players }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Sent once per join or reattach.
    Welcome { id: PlayerId, state: StateSnapshot, world: Map },

    /// Full snapshot.
    State { state: StateSnapshot },

    Shot(ShotMessage),

    Kill { killer: Option<PlayerId>, killer_name: String, victim: PlayerId, victim_name: String },

    Winner { winner_id: Option<PlayerId>, winner_name: String },

    Explosion {
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<&'static str>,
        x: f32,
        y: f32,
        z: f32,
        r: f32,
    },

    GrenadeSpawn {
        id: String,
        kind: WeaponKind,
        owner_id: PlayerId,
        x: f32,
        y: f32,
        z: f32,
        vx: f32,
        vy: f32,
        vz: f32,
        fuse_at: u64,
        arm_at: u64,
    },

    Pickup { id: PlayerId, what: PowerWeaponKind },

    MinigunEmpty { id: PlayerId },

    Toast(ToastMessage),

    Slash { from: PlayerId, to: PlayerId, backstab: bool },

    /// Status debuff applied.
    Fart { from: PlayerId, to: PlayerId, until: u64 },

    /// Cloud visual on the debuffed player.
    FartPuff { to: PlayerId },

    /// Damage-over-time tick.
    FartDot { to: PlayerId, dmg: i32 },

    Sfx { kind: &'static str, x: f32, y: f32, z: f32, id: PlayerId },

    Leave { id: PlayerId },

    SnapSaved { file: String },
}

/// Body of a `shot` message. Optional extras depend on the weapon.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotMessage {
    pub weapon: WeaponKind,
    pub from: PlayerId,
    pub sx: f32,
    pub sy: f32,
    pub sz: f32,
    pub yaw: f32,
    pub pitch: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ex: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ey: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ez: Option<f32>,
    pub hit: Option<PlayerId>,
    pub hit_hp: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dmg: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part: Option<HitPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traces: Option<Vec<TraceMessage>>,
}

/// One pellet tracer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceMessage {
    pub ex: f32,
    pub ez: f32,
    pub hit: Option<PlayerId>,
}

/// Body of a `toast` message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToastMessage {
    pub kind: &'static str,
    pub id: PlayerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub against: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus: Option<u32>,
}

impl From<&ShotEvent> for ShotMessage {
    fn from(shot: &ShotEvent) -> Self {
        let traces = (!shot.traces.is_empty()).then(|| {
            shot.traces
                .iter()
                .map(|t| TraceMessage { ex: t.end.x, ez: t.end.z, hit: t.hit })
                .collect()
        });
        Self {
            weapon: shot.weapon,
            from: shot.from,
            sx: shot.origin.x,
            sy: shot.origin.y,
            sz: shot.origin.z,
            yaw: shot.yaw,
            pitch: shot.pitch,
            ex: shot.end.map(|e| e.x),
            ey: shot.end.map(|e| e.y),
            ez: shot.end.map(|e| e.z),
            hit: shot.hit,
            hit_hp: shot.hit_hp,
            dmg: shot.damage,
            part: shot.part,
            traces,
        }
    }
}

impl From<&Toast> for ToastMessage {
    fn from(toast: &Toast) -> Self {
        let base = |kind, id| ToastMessage { kind, id, n: None, against: None, bonus: None };
        match *toast {
            Toast::Clutch { player } => base("clutch", player),
            Toast::Streak { player, count } => ToastMessage { n: Some(count), bonus: Some(1), ..base("streak", player) },
            Toast::FirstBlood { player } => ToastMessage { bonus: Some(1), ..base("firstblood", player) },
            Toast::Revenge { player, against } => {
                ToastMessage { against: Some(against), bonus: Some(1), ..base("revenge", player) }
            }
        }
    }
}

impl ServerMessage {
    /// Wire messages for one game event. `StateChanged` maps to nothing; the
    /// session answers it with a fresh snapshot.
    pub fn from_event(event: &GameEvent) -> Vec<ServerMessage> {
        let msg = match event {
            GameEvent::Shot(shot) => ServerMessage::Shot(shot.into()),
            GameEvent::Slash { from, to, backstab } => ServerMessage::Slash { from: *from, to: *to, backstab: *backstab },
            GameEvent::Kill { killer, victim, victim_name } => ServerMessage::Kill {
                killer: killer.as_ref().map(|(id, _)| *id),
                killer_name: killer.as_ref().map_or_else(|| NOBODY.to_string(), |(_, name)| name.clone()),
                victim: *victim,
                victim_name: victim_name.clone(),
            },
            GameEvent::Winner { winner } => ServerMessage::Winner {
                winner_id: winner.as_ref().map(|(id, _)| *id),
                winner_name: winner.as_ref().map_or_else(|| NOBODY.to_string(), |(_, name)| name.clone()),
            },
            GameEvent::Explosion { grenade, position, radius } => ServerMessage::Explosion {
                kind: grenade.then_some("grenade"),
                x: position.x,
                y: position.y,
                z: position.z,
                r: *radius,
            },
            GameEvent::GrenadeSpawn { id, kind, owner, position, velocity, fuse_at, arm_at } => {
                ServerMessage::GrenadeSpawn {
                    id: id.to_string(),
                    kind: *kind,
                    owner_id: *owner,
                    x: position.x,
                    y: position.y,
                    z: position.z,
                    vx: velocity.x,
                    vy: velocity.y,
                    vz: velocity.z,
                    fuse_at: *fuse_at,
                    arm_at: *arm_at,
                }
            }
            GameEvent::Pickup { player, what } => ServerMessage::Pickup { id: *player, what: *what },
            GameEvent::MinigunEmpty { player } => ServerMessage::MinigunEmpty { id: *player },
            GameEvent::Toast(toast) => ServerMessage::Toast(toast.into()),
            GameEvent::StatusApplied { from, to, until } => {
                return vec![
                    ServerMessage::Fart { from: *from, to: *to, until: *until },
                    ServerMessage::FartPuff { to: *to },
                ];
            }
            GameEvent::StatusTick { to, damage } => ServerMessage::FartDot { to: *to, dmg: *damage },
            GameEvent::ReloadStarted { player, position } => ServerMessage::Sfx {
                kind: "reload",
                x: position.x,
                y: position.y,
                z: position.z,
                id: *player,
            },
            GameEvent::Leave { player } => ServerMessage::Leave { id: *player },
            GameEvent::StateChanged => return Vec::new(),
        };
        vec![msg]
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ClientMessage {
    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
