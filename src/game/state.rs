//! Game State Definitions
//!
//! The canonical mutable store: players, pickup pads, world drops, grenades
//! and round metadata. One [`World`] is owned by the server and passed by
//! reference into every gameplay function; nothing here is global.
//! Players live in a BTreeMap so every sweep visits them in id order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::rng::DeterministicRng;
use crate::core::vec3::Vec3;
use crate::game::events::GameEvent;
use crate::game::map::{Map, MapRegistry, DEFAULT_MAP_ID};
use crate::game::pickup;
use crate::game::round::RoundState;
use crate::game::tick::MatchConfig;
use crate::game::weapon::{PowerWeaponKind, WeaponKind};

/// Height of a standing player's eye above the floor.
pub const GROUND_HEIGHT: f32 = 1.8;

/// Full health.
pub const MAX_HP: i32 = 100;

/// Maximum display name length in characters.
pub const MAX_NAME_LEN: usize = 16;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Server-assigned player identifier.
///
/// Ids increase monotonically and are never reused for the life of a world.
/// On the wire an id is a decimal string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for PlayerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PlayerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u32),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(PlayerId(n)),
            Raw::Str(s) => s
                .trim()
                .parse()
                .map(PlayerId)
                .map_err(|_| serde::de::Error::custom(format!("invalid player id: {}", s))),
        }
    }
}

// =============================================================================
// ACTION ERRORS
// =============================================================================

/// Why a gameplay action was rejected.
///
/// None of these are fatal; callers log and drop them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("round is not running")]
    RoundNotRunning,

    #[error("round already started")]
    RoundAlreadyStarted,

    #[error("player is dead")]
    Dead,

    #[error("weapon on cooldown")]
    Cooldown,

    #[error("reload in progress")]
    Reloading,

    #[error("magazine empty")]
    EmptyMagazine,

    #[error("magazine already full")]
    MagazineFull,

    #[error("minigun not ready: {0}")]
    MinigunNotReady(&'static str),

    #[error("no power weapon held")]
    NoPowerWeapon,

    #[error("already carrying a power weapon")]
    AlreadyArmed,

    #[error("unknown pickup {0}")]
    UnknownPickup(String),

    #[error("pickup {0} unavailable")]
    PickupUnavailable(String),

    #[error("pickup {0} out of range")]
    OutOfRange(String),

    #[error("unknown map {0}")]
    UnknownMap(String),

    #[error("only the host may do that")]
    NotHost,
}

// =============================================================================
// PLAYER STATE
// =============================================================================

/// Power weapon currently carried.
#[derive(Clone, Debug, PartialEq)]
pub struct PowerWeapon {
    pub kind: PowerWeaponKind,
    pub ammo: u32,
    /// Barrel spin in [0, 1]
    pub spin: f32,
    /// Heat in [0, 1]
    pub heat: f32,
    pub overheated: bool,
}

impl PowerWeapon {
    /// Freshly picked up weapon with full ammo.
    pub fn new(kind: PowerWeaponKind) -> Self {
        Self { kind, ammo: kind.full_ammo(), spin: 0.0, heat: 0.0, overheated: false }
    }
}

/// Damage-over-time debuff.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusEffect {
    pub until: u64,
    /// Last time damage was applied (or the application time)
    pub last_tick_at: u64,
}

/// State of a single player.
#[derive(Clone, Debug)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub position: Vec3,
    pub vy: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub hp: i32,
    pub score: u32,
    pub deaths: u32,

    /// Rounds left in the shared magazine
    pub ammo: u32,
    pub reload_until: Option<u64>,
    pub auto_reload: bool,
    pub last_shot_at: Option<u64>,
    pub last_input_at: u64,
    pub invuln_until: u64,
    pub respawn_at: Option<u64>,
    pub status: Option<StatusEffect>,
    pub power: Option<PowerWeapon>,

    /// Set while no connection is bound to this player
    pub disconnected_at: Option<u64>,

    pub streak: u32,
    pub last_kill_at: Option<u64>,
    pub last_killed_by: Option<PlayerId>,

    pub color: String,
}

impl Player {
    /// Create a new player standing at `spawn`.
    pub fn new(id: PlayerId, name: &str, spawn: Vec3, magazine: u32, now: u64) -> Self {
        Self {
            id,
            name: sanitize_name(name),
            position: spawn,
            vy: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            hp: MAX_HP,
            score: 0,
            deaths: 0,
            ammo: magazine,
            reload_until: None,
            auto_reload: true,
            last_shot_at: None,
            last_input_at: now,
            invuln_until: 0,
            respawn_at: None,
            status: None,
            power: None,
            disconnected_at: None,
            streak: 0,
            last_kill_at: None,
            last_killed_by: None,
            color: format!("hsl({} 80% 60%)", (id.0 as u64 * 137) % 360),
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.disconnected_at.is_none()
    }

    #[inline]
    pub fn is_invulnerable(&self, now: u64) -> bool {
        now < self.invuln_until
    }

    #[inline]
    pub fn is_reloading(&self, now: u64) -> bool {
        self.reload_until.is_some_and(|until| now < until)
    }

    /// Weapon held by the power slot, if any.
    pub fn power_kind(&self) -> Option<PowerWeaponKind> {
        self.power.as_ref().map(|p| p.kind)
    }

    /// Weapon actually used when firing with `requested` selected.
    pub fn effective_weapon(&self, requested: WeaponKind) -> WeaponKind {
        match self.power_kind() {
            Some(kind) => kind.weapon(),
            None => requested,
        }
    }

    /// Refill the magazine if the reload deadline has passed.
    pub fn finish_reload(&mut self, now: u64, magazine: u32) -> bool {
        match self.reload_until {
            Some(until) if now >= until => {
                self.ammo = magazine;
                self.reload_until = None;
                true
            }
            _ => false,
        }
    }
}

/// Trim a display name to the allowed length, defaulting when empty.
pub fn sanitize_name(name: &str) -> String {
    let trimmed: String = name.trim().chars().take(MAX_NAME_LEN).collect();
    if trimmed.is_empty() {
        "Hunter".to_string()
    } else {
        trimmed
    }
}

// =============================================================================
// PICKUPS AND PROJECTILES
// =============================================================================

/// A fixed pickup location.
#[derive(Clone, Debug, PartialEq)]
pub struct PickupPad {
    pub id: String,
    pub kind: PowerWeaponKind,
    pub position: Vec3,
    pub held_by: Option<PlayerId>,
    /// Usable once now >= available_at and nobody holds it
    pub available_at: u64,
}

impl PickupPad {
    #[inline]
    pub fn is_available(&self, now: u64) -> bool {
        self.held_by.is_none() && now >= self.available_at
    }
}

/// Ephemeral pickup left by a death or a voluntary drop.
#[derive(Clone, Debug, PartialEq)]
pub struct WorldDrop {
    pub kind: PowerWeaponKind,
    pub position: Vec3,
    pub expires_at: u64,
}

impl WorldDrop {
    /// Pickup id clients use to claim this drop.
    pub fn id(&self) -> String {
        drop_id(self.kind)
    }
}

/// Pickup id of the drop slot for `kind`.
pub fn drop_id(kind: PowerWeaponKind) -> String {
    format!("drop_{}", kind.id())
}

/// Server-simulated thrown grenade.
#[derive(Clone, Debug, PartialEq)]
pub struct Grenade {
    pub id: u32,
    pub kind: WeaponKind,
    pub owner: PlayerId,
    pub position: Vec3,
    pub velocity: Vec3,
    pub spawned_at: u64,
    pub fuse_at: u64,
    pub arm_at: u64,
    pub exploded: bool,
}

// =============================================================================
// WORLD
// =============================================================================

/// Complete simulation state.
pub struct World {
    pub config: MatchConfig,
    maps: Arc<MapRegistry>,
    pub rng: DeterministicRng,
    pub players: BTreeMap<PlayerId, Player>,
    pub pads: Vec<PickupPad>,
    pub drops: Vec<WorldDrop>,
    pub grenades: Vec<Grenade>,
    pub round: RoundState,
    next_player_id: u32,
    next_grenade_id: u32,
    events: Vec<GameEvent>,
}

impl World {
    /// Create an empty world on the default map.
    pub fn new(config: MatchConfig, maps: Arc<MapRegistry>, seed: u64) -> Self {
        let map_id = maps.get_or_default(DEFAULT_MAP_ID).id.clone();
        let pads = pickup::build_pads(maps.get_or_default(&map_id));
        Self {
            config,
            maps,
            rng: DeterministicRng::new(seed),
            players: BTreeMap::new(),
            pads,
            drops: Vec::new(),
            grenades: Vec::new(),
            round: RoundState::new(map_id),
            next_player_id: 1,
            next_grenade_id: 1,
            events: Vec::new(),
        }
    }

    /// Map currently in play.
    pub fn active_map(&self) -> &Map {
        self.maps.get_or_default(&self.round.map_id)
    }

    /// Registry of all known maps.
    pub fn maps(&self) -> &MapRegistry {
        &self.maps
    }

    /// Add a fresh player. The first player in an empty world becomes host.
    pub fn add_player(&mut self, name: &str, now: u64) -> PlayerId {
        let id = PlayerId(self.next_player_id);
        self.next_player_id += 1;

        let spawn = {
            let points = &self.active_map().spawn_points;
            points
                .get((id.0 as usize - 1) % points.len().max(1))
                .copied()
                .unwrap_or(Vec3::new(0.0, GROUND_HEIGHT, 0.0))
        };
        let player = Player::new(id, name, spawn, self.config.magazine_size, now);
        self.players.insert(id, player);

        if self.round.host.is_none() {
            self.round.host = Some(id);
        }
        id
    }

    /// Remove a player completely: pads it held go on cooldown and the host
    /// moves on. An emptied world falls back to the lobby.
    pub fn remove_player(&mut self, id: PlayerId, now: u64) -> Option<Player> {
        let removed = self.players.remove(&id)?;
        let pad_available_at = now + self.config.pad_release_cooldown_ms;
        pickup::release_pads_held_by(self, id, pad_available_at);
        if self.round.host == Some(id) {
            self.reassign_host();
        }
        if self.players.is_empty() {
            self.round.host = None;
            self.round.return_to_lobby();
        }
        Some(removed)
    }

    /// Hand host to the lowest-id connected player, or nobody.
    pub fn reassign_host(&mut self) {
        self.round.host = self
            .players
            .values()
            .find(|p| p.is_connected())
            .map(|p| p.id);
    }

    pub fn get_player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn get_player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    /// Same as [`get_player`](Self::get_player) but as an action error.
    pub fn player(&self, id: PlayerId) -> Result<&Player, ActionError> {
        self.players.get(&id).ok_or(ActionError::UnknownPlayer(id))
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Result<&mut Player, ActionError> {
        self.players.get_mut(&id).ok_or(ActionError::UnknownPlayer(id))
    }

    /// Mutable player together with the active map.
    pub fn player_on_map(&mut self, id: PlayerId) -> Result<(&mut Player, &Map), ActionError> {
        let map = self.maps.get_or_default(&self.round.map_id);
        let player = self.players.get_mut(&id).ok_or(ActionError::UnknownPlayer(id))?;
        Ok((player, map))
    }

    /// Allocate a grenade id.
    pub fn next_grenade_id(&mut self) -> u32 {
        let id = self.next_grenade_id;
        self.next_grenade_id += 1;
        id
    }

    /// Take all pending events.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Queue an event.
    pub fn push_event(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    /// Pending events, oldest first.
    pub fn pending_events(&self) -> &[GameEvent] {
        &self.events
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("map", &self.round.map_id)
            .field("phase", &self.round.phase)
            .field("players", &self.players.len())
            .field("grenades", &self.grenades.len())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
