//! Round State Machine
//!
//! Lobby -> Active -> Over -> (delay) -> Lobby.
//!
//! The delayed return to the lobby is a [`Scheduled`] entry evaluated by the
//! tick against simulation time. Every transition bumps a generation counter
//! and scheduled resets carry the generation they were created for, so a
//! reset that outlived its round (lobby reset, forced start) does nothing.

use tracing::{debug, info};

use crate::core::vec3::Vec3;
use crate::game::events::GameEvent;
use crate::game::pickup;
use crate::game::state::{ActionError, PlayerId, World, GROUND_HEIGHT, MAX_HP};

/// Random spawn candidates examined per respawn.
pub const SPAWN_TRIES: usize = 8;

/// Preferred minimum floor distance from any living opponent.
pub const SPAWN_SAFE_DISTANCE: f32 = 10.0;

// =============================================================================
// STATE
// =============================================================================

/// Current phase of the round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundPhase {
    /// Waiting for someone to start
    Lobby,
    /// Round in progress
    Active,
    /// Winner announced, waiting for the scheduled reset
    Over { at: u64 },
}

/// Work deferred to a later tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduledEvent {
    /// Return to the lobby, valid only for the given round generation
    RoundReset { generation: u64 },
}

/// A deferred event and when it becomes due.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scheduled {
    pub at: u64,
    pub event: ScheduledEvent,
}

/// Round metadata singleton.
#[derive(Clone, Debug)]
pub struct RoundState {
    pub phase: RoundPhase,
    pub host: Option<PlayerId>,
    /// Round deadline, 0 outside a round
    pub ends_at: u64,
    pub map_id: String,
    pub first_blood: bool,
    pub generation: u64,
    pub schedule: Vec<Scheduled>,
}

impl RoundState {
    pub fn new(map_id: String) -> Self {
        Self {
            phase: RoundPhase::Lobby,
            host: None,
            ends_at: 0,
            map_id,
            first_blood: false,
            generation: 0,
            schedule: Vec::new(),
        }
    }

    /// True once started and until the reset back to the lobby.
    pub fn is_started(&self) -> bool {
        !matches!(self.phase, RoundPhase::Lobby)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, RoundPhase::Active)
    }

    pub fn is_over(&self) -> bool {
        matches!(self.phase, RoundPhase::Over { .. })
    }

    /// Wire name of the phase.
    pub fn phase_name(&self) -> &'static str {
        match self.phase {
            RoundPhase::Lobby => "lobby",
            RoundPhase::Active => "active",
            RoundPhase::Over { .. } => "over",
        }
    }

    /// Clear round flags and pending work, landing in the lobby.
    pub fn return_to_lobby(&mut self) {
        self.phase = RoundPhase::Lobby;
        self.ends_at = 0;
        self.first_blood = false;
        self.generation += 1;
        self.schedule.clear();
    }

    fn begin(&mut self, now: u64, duration_ms: u64) {
        self.phase = RoundPhase::Active;
        self.ends_at = now + duration_ms;
        self.first_blood = false;
        self.generation += 1;
        self.schedule.clear();
    }

    /// Remove and return every entry due at `now`, in due order.
    fn take_due(&mut self, now: u64) -> Vec<Scheduled> {
        let (mut due, pending): (Vec<_>, Vec<_>) = self.schedule.drain(..).partition(|s| s.at <= now);
        self.schedule = pending;
        due.sort_by_key(|s| s.at);
        due
    }
}

// =============================================================================
// TRANSITIONS
// =============================================================================

/// Lobby -> Active.
pub fn start_round(world: &mut World, now: u64) -> Result<(), ActionError> {
    if world.round.is_started() {
        return Err(ActionError::RoundAlreadyStarted);
    }
    world.round.begin(now, world.config.round_duration_ms);
    refresh_activity(world, now);
    info!(map = %world.round.map_id, ends_at = world.round.ends_at, "round started");
    world.push_event(GameEvent::StateChanged);
    Ok(())
}

/// Force the round into Active from any phase.
pub fn force_start(world: &mut World, now: u64) {
    if !world.round.is_active() {
        world.round.begin(now, world.config.round_duration_ms);
        refresh_activity(world, now);
        info!("round force-started");
    }
    world.push_event(GameEvent::StateChanged);
}

/// Lobby idling does not count toward the AFK timeout.
fn refresh_activity(world: &mut World, now: u64) {
    for p in world.players.values_mut() {
        p.last_input_at = now;
    }
}

/// Active -> Over. Returns false if the round was not active, so the winner
/// is announced once no matter how many kills cross the line.
pub fn end_round(world: &mut World, winner: Option<PlayerId>, now: u64, reset_delay_ms: u64) -> bool {
    if !world.round.is_active() {
        return false;
    }
    world.round.phase = RoundPhase::Over { at: now };
    let generation = world.round.generation;
    world.round.schedule.push(Scheduled {
        at: now + reset_delay_ms,
        event: ScheduledEvent::RoundReset { generation },
    });

    let winner = winner.and_then(|id| world.get_player(id).map(|p| (p.id, p.name.clone())));
    info!(winner = ?winner, "round over");
    world.push_event(GameEvent::Winner { winner });
    true
}

/// End the round if `shooter` reached the win score.
pub fn check_score_win(world: &mut World, shooter: PlayerId, now: u64) -> bool {
    let reached = world
        .get_player(shooter)
        .is_some_and(|p| p.score >= world.config.win_score);
    let delay = world.config.score_reset_delay_ms;
    reached && end_round(world, Some(shooter), now, delay)
}

/// End the round when its deadline passes. The top scorer wins; ties go to
/// the lowest id.
pub fn check_time_limit(world: &mut World, now: u64) -> bool {
    if !world.round.is_active() || world.round.ends_at == 0 || now < world.round.ends_at {
        return false;
    }
    let mut best: Option<(PlayerId, u32)> = None;
    for p in world.players.values() {
        if best.map_or(true, |(_, score)| p.score > score) {
            best = Some((p.id, p.score));
        }
    }
    let delay = world.config.time_reset_delay_ms;
    end_round(world, best.map(|(id, _)| id), now, delay)
}

/// Run scheduled events that are due.
pub fn run_schedule(world: &mut World, now: u64) {
    for entry in world.round.take_due(now) {
        match entry.event {
            ScheduledEvent::RoundReset { generation } => {
                if generation == world.round.generation && world.round.is_over() {
                    reset_round(world, now);
                } else {
                    debug!(generation, current = world.round.generation, "stale round reset ignored");
                }
            }
        }
    }
}

/// Over -> Lobby: zero the scoreboard and respawn everyone.
pub fn reset_round(world: &mut World, now: u64) {
    let ids: Vec<PlayerId> = world.players.keys().copied().collect();
    for id in ids {
        if let Some(p) = world.get_player_mut(id) {
            p.score = 0;
            p.deaths = 0;
            p.streak = 0;
            p.last_kill_at = None;
            p.last_killed_by = None;
        }
        respawn(world, id, now);
    }
    world.round.return_to_lobby();
    info!("round reset to lobby");
    world.push_event(GameEvent::StateChanged);
}

/// Switch maps. Lobby only.
pub fn set_map(world: &mut World, map_id: &str, now: u64) -> Result<(), ActionError> {
    if world.round.is_started() {
        return Err(ActionError::RoundAlreadyStarted);
    }
    let map = world
        .maps()
        .get(map_id)
        .ok_or_else(|| ActionError::UnknownMap(map_id.to_string()))?;
    let pads = pickup::build_pads(map);
    let id = map.id.clone();

    world.round.map_id = id;
    world.pads = pads;
    world.drops.clear();
    world.grenades.clear();

    let ids: Vec<PlayerId> = world.players.keys().copied().collect();
    for pid in ids {
        respawn(world, pid, now);
    }
    info!(map = %world.round.map_id, "map selected");
    world.push_event(GameEvent::StateChanged);
    Ok(())
}

/// Host-only reset: every other player is removed and the round returns to
/// the lobby. Returns the removed ids.
pub fn reset_lobby(world: &mut World, requester: PlayerId, now: u64) -> Result<Vec<PlayerId>, ActionError> {
    world.player(requester)?;
    if world.round.host != Some(requester) {
        return Err(ActionError::NotHost);
    }

    let removed: Vec<PlayerId> = world.players.keys().copied().filter(|id| *id != requester).collect();
    let available_at = now + world.config.pad_release_cooldown_ms;
    for id in &removed {
        world.players.remove(id);
        pickup::release_pads_held_by(world, *id, available_at);
    }
    world.grenades.retain(|g| g.owner == requester);
    world.round.host = Some(requester);
    world.round.return_to_lobby();
    info!(host = %requester, removed = removed.len(), "lobby reset");
    world.push_event(GameEvent::StateChanged);
    Ok(removed)
}

// =============================================================================
// SPAWNING
// =============================================================================

/// Bring `id` back to full health at a spawn point.
///
/// Clears reload, status and power weapon; grants spawn invulnerability and
/// releases any pad the player held.
pub fn respawn(world: &mut World, id: PlayerId, now: u64) {
    let spawn = choose_spawn(world, id);
    let magazine = world.config.magazine_size;
    let invuln_until = now + world.config.spawn_invuln_ms;
    let pad_available_at = now + world.config.pad_release_cooldown_ms;

    let Some(p) = world.get_player_mut(id) else {
        return;
    };
    p.position = spawn;
    p.vy = 0.0;
    p.hp = MAX_HP;
    p.respawn_at = None;
    p.invuln_until = invuln_until;
    p.ammo = magazine;
    p.reload_until = None;
    p.status = None;
    p.power = None;

    pickup::release_pads_held_by(world, id, pad_available_at);
}

/// Pick a spawn point away from living opponents.
///
/// Tries up to [`SPAWN_TRIES`] random points and takes the first that is at
/// least [`SPAWN_SAFE_DISTANCE`] from everyone alive, else the best one seen.
pub fn choose_spawn(world: &mut World, id: PlayerId) -> Vec3 {
    let points = world.active_map().spawn_points.clone();
    let mut best: Option<(Vec3, f32)> = None;

    for _ in 0..SPAWN_TRIES {
        let Some(&candidate) = world.rng.choose(&points) else {
            break;
        };
        let nearest = world
            .players
            .values()
            .filter(|p| p.id != id && p.is_alive())
            .map(|p| p.position.distance_xz(candidate))
            .fold(f32::INFINITY, f32::min);
        if nearest >= SPAWN_SAFE_DISTANCE {
            return candidate;
        }
        if best.map_or(true, |(_, d)| nearest > d) {
            best = Some((candidate, nearest));
        }
    }

    best.map(|(p, _)| p)
        .or_else(|| points.first().copied())
        .unwrap_or(Vec3::new(0.0, GROUND_HEIGHT, 0.0))
}

// =============================================================================
// TESTS
// =============================================================================
