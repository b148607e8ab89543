//! Combat Resolution
//!
//! Turns a fire request into damage and events. Gating (round, cooldown,
//! reload, magazine, minigun readiness) happens first; the weapon's
//! [`WeaponBehavior`] then picks the resolver. Every point of damage goes
//! through [`apply_damage`], which owns invulnerability, clutch saves, deaths,
//! kill bonuses and the score win check.

use tracing::debug;

use crate::core::vec3::Vec3;
use crate::game::events::{GameEvent, HitPart, PelletTrace, ShotEvent, Toast};
use crate::game::grenade;
use crate::game::pickup;
use crate::game::round;
use crate::game::state::{ActionError, Player, PlayerId, StatusEffect, World, GROUND_HEIGHT};
use crate::game::weapon::{
    HitscanSpec, MeleeSpec, MinigunSpec, RocketSpec, ShotgunSpec, SniperSpec, StatusSpec, WeaponBehavior,
    WeaponKind, MINIGUN_SPEC, RIFLE_HITSCAN,
};

/// Radius of the body cylinder used by flat rays.
pub const BODY_RADIUS: f32 = 0.9;

const HEAD_OFFSET: f32 = 0.75;
const HEAD_RADIUS: f32 = 0.35;
const TORSO_OFFSET: f32 = 0.15;
const TORSO_RADIUS: f32 = 0.75;

/// Where a knife tracer ends, in front of the attacker.
const MELEE_REACH_FX: f32 = 1.0;

// =============================================================================
// RAYS
// =============================================================================

/// Result of a ray cast.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub target: Option<PlayerId>,
    /// Distance along the ray to the hit, or the full range on a miss
    pub distance: f32,
    pub end: Vec3,
    pub part: Option<HitPart>,
}

/// Horizontal ray from `origin` along `yaw`. Pitch is ignored.
///
/// A living player is hit when their floor position lies within
/// [`BODY_RADIUS`] of the ray and no further than `range` along it. The
/// nearest such player wins.
pub fn flat_ray(world: &World, shooter: PlayerId, origin: Vec3, yaw: f32, range: f32) -> RayHit {
    let dir = Vec3::from_yaw(yaw);
    let mut best: Option<(PlayerId, f32)> = None;

    for p in world.players.values() {
        if p.id == shooter || !p.is_alive() {
            continue;
        }
        let v = (p.position - origin).flatten();
        let proj = v.dot(dir);
        if !(0.0..=range).contains(&proj) {
            continue;
        }
        let perp = v - dir * proj;
        if perp.length_squared() <= BODY_RADIUS * BODY_RADIUS && best.map_or(true, |(_, d)| proj < d) {
            best = Some((p.id, proj));
        }
    }

    let distance = best.map_or(range, |(_, d)| d);
    RayHit {
        target: best.map(|(id, _)| id),
        distance,
        end: origin + dir * distance,
        part: None,
    }
}

/// Full 3D ray along yaw and pitch, tested against a head and a torso sphere
/// per player. The nearest sphere wins; an exact tie prefers the head.
pub fn ray_3d(world: &World, shooter: PlayerId, origin: Vec3, yaw: f32, pitch: f32, range: f32) -> RayHit {
    let dir = Vec3::from_yaw_pitch(yaw, pitch);
    let mut best: Option<(PlayerId, f32, HitPart)> = None;

    for p in world.players.values() {
        if p.id == shooter || !p.is_alive() {
            continue;
        }
        let spheres = [
            (HitPart::Head, p.position.y + HEAD_OFFSET, HEAD_RADIUS),
            (HitPart::Body, p.position.y + TORSO_OFFSET, TORSO_RADIUS),
        ];
        for (part, cy, r) in spheres {
            let v = Vec3::new(p.position.x, cy, p.position.z) - origin;
            let t = v.dot(dir);
            if !(0.0..=range).contains(&t) {
                continue;
            }
            if (v - dir * t).length_squared() > r * r {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, bt, _)) => t < bt || (t == bt && part == HitPart::Head),
            };
            if better {
                best = Some((p.id, t, part));
            }
        }
    }

    let distance = best.map_or(range, |(_, t, _)| t);
    RayHit {
        target: best.map(|(id, _, _)| id),
        distance,
        end: origin + dir * distance,
        part: best.map(|(_, _, part)| part),
    }
}

// =============================================================================
// DAMAGE
// =============================================================================

/// Result of one damage application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DamageOutcome {
    pub hit: Option<PlayerId>,
    pub hit_hp: Option<i32>,
    pub killed: bool,
}

impl DamageOutcome {
    pub const MISS: Self = Self { hit: None, hit_hp: None, killed: false };
}

/// Apply `amount` damage from `shooter` to `target`.
///
/// Dead and invulnerable targets are untouched. A hit that would kill a
/// target above 1 HP may instead leave them at exactly 1 (clutch save).
pub fn apply_damage(
    world: &mut World,
    shooter: Option<PlayerId>,
    target: PlayerId,
    amount: i32,
    now: u64,
) -> DamageOutcome {
    let Some(victim) = world.get_player(target) else {
        return DamageOutcome::MISS;
    };
    if !victim.is_alive() || victim.is_invulnerable(now) {
        return DamageOutcome::MISS;
    }

    let hp = victim.hp;
    if hp > 1 && hp - amount <= 0 {
        let clutch = world.config.clutch_chance;
        if world.rng.chance(clutch) {
            if let Some(victim) = world.get_player_mut(target) {
                victim.hp = 1;
            }
            world.push_event(GameEvent::Toast(Toast::Clutch { player: target }));
            return DamageOutcome { hit: Some(target), hit_hp: Some(1), killed: false };
        }
    }

    let remaining = (hp - amount).max(0);
    if let Some(victim) = world.get_player_mut(target) {
        victim.hp = remaining;
    }
    if remaining > 0 {
        return DamageOutcome { hit: Some(target), hit_hp: Some(remaining), killed: false };
    }

    handle_death(world, target, shooter, now);
    DamageOutcome { hit: Some(target), hit_hp: Some(0), killed: true }
}

/// Kill `victim`: schedule the respawn, drop any power weapon, award the
/// killer and check the win score.
///
/// `killer` is `None` for deaths nobody gets credit for. A player killing
/// themselves earns nothing.
pub fn handle_death(world: &mut World, victim: PlayerId, killer: Option<PlayerId>, now: u64) {
    let respawn_at = now + world.config.respawn_delay_ms;
    let victim_name = match world.get_player_mut(victim) {
        Some(p) => {
            p.hp = 0;
            p.respawn_at = Some(respawn_at);
            p.deaths += 1;
            p.name.clone()
        }
        None => return,
    };

    pickup::drop_on_death(world, victim, now);

    let killer = killer.and_then(|id| world.get_player(id).map(|p| (p.id, p.name.clone())));
    if let Some((killer_id, _)) = &killer {
        if *killer_id != victim {
            award_kill(world, *killer_id, victim, now);
        }
    }

    debug!(victim = %victim, killer = ?killer, "player killed");
    world.push_event(GameEvent::Kill { killer: killer.clone(), victim, victim_name });

    if let Some((killer_id, _)) = killer {
        round::check_score_win(world, killer_id, now);
    }
}

/// Base kill point plus streak, first blood and revenge bonuses.
fn award_kill(world: &mut World, killer: PlayerId, victim: PlayerId, now: u64) {
    let window = world.config.streak_window_ms;
    let first_blood = world.round.is_active() && !world.round.first_blood;
    if first_blood {
        world.round.first_blood = true;
    }

    let mut toasts = Vec::new();
    if let Some(p) = world.get_player_mut(killer) {
        p.score += 1;

        let within = p.last_kill_at.is_some_and(|last| now.saturating_sub(last) <= window);
        p.streak = if within { p.streak + 1 } else { 1 };
        p.last_kill_at = Some(now);
        if p.streak >= 2 {
            p.score += 1;
            toasts.push(Toast::Streak { player: killer, count: p.streak });
        }

        if first_blood {
            p.score += 1;
            toasts.push(Toast::FirstBlood { player: killer });
        }

        if p.last_killed_by == Some(victim) {
            p.score += 1;
            toasts.push(Toast::Revenge { player: killer, against: victim });
        }
    }

    if let Some(v) = world.get_player_mut(victim) {
        v.last_killed_by = Some(killer);
    }
    for toast in toasts {
        world.push_event(GameEvent::Toast(toast));
    }
}

// =============================================================================
// FIRING
// =============================================================================

/// Snapshot of the shooter taken before resolution.
#[derive(Clone, Copy, Debug)]
struct Muzzle {
    id: PlayerId,
    origin: Vec3,
    yaw: f32,
    pitch: f32,
}

impl Muzzle {
    fn of(p: &Player) -> Self {
        Self { id: p.id, origin: p.position, yaw: p.yaw, pitch: p.pitch }
    }

    fn shot(&self, weapon: WeaponKind) -> ShotEvent {
        ShotEvent {
            weapon,
            from: self.id,
            origin: self.origin,
            yaw: self.yaw,
            pitch: self.pitch,
            end: None,
            hit: None,
            hit_hp: None,
            damage: None,
            part: None,
            traces: Vec::new(),
        }
    }
}

/// Fire `requested` for player `id`.
///
/// A held power weapon overrides the request.
pub fn fire(world: &mut World, id: PlayerId, requested: WeaponKind, now: u64) -> Result<(), ActionError> {
    if !world.round.is_started() {
        return Err(ActionError::RoundNotRunning);
    }
    let reload_ms = world.config.reload_ms;
    let p = world.player_mut(id)?;
    if !p.is_alive() {
        return Err(ActionError::Dead);
    }

    let weapon = p.effective_weapon(requested);
    let def = weapon.def();

    if p.last_shot_at.is_some_and(|last| now.saturating_sub(last) <= def.fire_cd_ms) {
        return Err(ActionError::Cooldown);
    }
    if p.is_reloading(now) {
        return Err(ActionError::Reloading);
    }
    if def.uses_magazine && p.ammo == 0 {
        if p.auto_reload {
            p.reload_until = Some(now + reload_ms);
        }
        return Err(ActionError::EmptyMagazine);
    }

    if let WeaponBehavior::Minigun(spec) = def.behavior {
        let ready = match &p.power {
            Some(power) if power.ammo == 0 => Err(ActionError::MinigunNotReady("empty")),
            Some(power) if power.overheated => Err(ActionError::MinigunNotReady("overheated")),
            Some(power) if power.spin < spec.min_spin => Err(ActionError::MinigunNotReady("spinning up")),
            Some(_) => Ok(()),
            None => Err(ActionError::NoPowerWeapon),
        };
        if let Err(e) = ready {
            if e == ActionError::MinigunNotReady("empty") {
                pickup::strip_empty(world, id, now);
            }
            return Err(e);
        }
    }

    p.last_shot_at = Some(now);
    if def.uses_magazine {
        p.ammo -= 1;
    }
    let muzzle = Muzzle::of(p);

    match def.behavior {
        WeaponBehavior::Hitscan(spec) => fire_hitscan(world, muzzle, weapon, &spec, now),
        WeaponBehavior::Shotgun(spec) => fire_shotgun(world, muzzle, weapon, &spec, now),
        WeaponBehavior::Hitscan3d(spec) => fire_sniper(world, muzzle, weapon, &spec, now),
        WeaponBehavior::Status(spec) => fire_status(world, muzzle, weapon, &spec, now),
        WeaponBehavior::Rocket(spec) => fire_rocket(world, muzzle, weapon, &spec, now),
        WeaponBehavior::Melee(spec) => fire_melee(world, muzzle, weapon, &spec, now),
        WeaponBehavior::Grenade(spec) => {
            grenade::spawn_grenade(world, id, weapon, &spec, now);
            let mut shot = muzzle.shot(weapon);
            shot.end = Some(muzzle.origin);
            world.push_event(GameEvent::Shot(shot));
        }
        WeaponBehavior::Minigun(spec) => fire_minigun(world, muzzle, &spec, now),
    }
    Ok(())
}

fn fire_hitscan(world: &mut World, m: Muzzle, weapon: WeaponKind, spec: &HitscanSpec, now: u64) {
    let ray = flat_ray(world, m.id, m.origin, m.yaw, spec.range);
    let mut damage = spec.damage;
    let mut outcome = DamageOutcome::MISS;
    if let Some(target) = ray.target {
        let dist = target_distance_xz(world, m.origin, target);
        damage = spec.falloff.apply(spec.damage, dist);
        outcome = apply_damage(world, Some(m.id), target, damage, now);
    }

    let mut shot = m.shot(weapon);
    shot.end = Some(Vec3::new(ray.end.x, m.origin.y, ray.end.z));
    shot.damage = Some(damage);
    shot.hit = outcome.hit;
    shot.hit_hp = outcome.hit_hp;
    world.push_event(GameEvent::Shot(shot));
}

fn fire_shotgun(world: &mut World, m: Muzzle, weapon: WeaponKind, spec: &ShotgunSpec, now: u64) {
    let mut shot = m.shot(weapon);
    for _ in 0..spec.pellets {
        let jitter = world.rng.next_signed(spec.spread);
        let ray = flat_ray(world, m.id, m.origin, m.yaw + jitter, spec.range);
        shot.traces.push(PelletTrace { end: ray.end, hit: ray.target });

        if let Some(target) = ray.target {
            let dist = target_distance_xz(world, m.origin, target);
            let damage = spec.falloff.apply(spec.pellet_damage, dist);
            let outcome = apply_damage(world, Some(m.id), target, damage, now);
            if outcome.hit.is_some() {
                shot.hit = outcome.hit;
                shot.hit_hp = outcome.hit_hp;
            }
        }
    }
    world.push_event(GameEvent::Shot(shot));
}

fn fire_sniper(world: &mut World, m: Muzzle, weapon: WeaponKind, spec: &SniperSpec, now: u64) {
    let ray = ray_3d(world, m.id, m.origin, m.yaw, m.pitch, spec.range);
    let mut outcome = DamageOutcome::MISS;
    if let Some(target) = ray.target {
        let damage = match ray.part {
            Some(HitPart::Head) => spec.head_damage,
            _ => spec.body_damage,
        };
        outcome = apply_damage(world, Some(m.id), target, damage, now);
    }

    let mut shot = m.shot(weapon);
    shot.end = Some(ray.end);
    shot.part = ray.part;
    shot.hit = outcome.hit;
    shot.hit_hp = outcome.hit_hp;
    world.push_event(GameEvent::Shot(shot));
}

fn fire_status(world: &mut World, m: Muzzle, weapon: WeaponKind, spec: &StatusSpec, now: u64) {
    let ray = flat_ray(world, m.id, m.origin, m.yaw, spec.range);
    let mut shot = m.shot(weapon);
    shot.end = Some(Vec3::new(ray.end.x, m.origin.y, ray.end.z));

    if let Some(target) = ray.target {
        let until = now + spec.duration_ms;
        if let Some(victim) = world.get_player_mut(target) {
            victim.status = Some(StatusEffect { until, last_tick_at: now });
            shot.hit = Some(target);
            shot.hit_hp = Some(victim.hp);
        }
        world.push_event(GameEvent::StatusApplied { from: m.id, to: target, until });
    }
    world.push_event(GameEvent::Shot(shot));
}

fn fire_rocket(world: &mut World, m: Muzzle, weapon: WeaponKind, spec: &RocketSpec, now: u64) {
    let ray = ray_3d(world, m.id, m.origin, m.yaw, m.pitch, spec.range);
    let blast = ray.end;
    let mut hit = DamageOutcome::MISS;

    if let Some(target) = ray.target {
        hit = apply_damage(world, Some(m.id), target, spec.direct_damage, now);
    }

    let splashed: Vec<(PlayerId, i32)> = world
        .players
        .values()
        .filter(|p| p.id != m.id && Some(p.id) != ray.target && p.is_alive())
        .filter_map(|p| spec.splash.damage_at(p.position.distance(blast)).map(|d| (p.id, d)))
        .collect();
    for (target, damage) in splashed {
        let outcome = apply_damage(world, Some(m.id), target, damage, now);
        if hit.hit.is_none() && outcome.hit.is_some() {
            hit = outcome;
        }
    }

    world.push_event(GameEvent::Explosion { grenade: false, position: blast, radius: spec.splash.radius });
    let mut shot = m.shot(weapon);
    shot.end = Some(blast);
    shot.hit = hit.hit;
    shot.hit_hp = hit.hit_hp;
    world.push_event(GameEvent::Shot(shot));
}

fn fire_melee(world: &mut World, m: Muzzle, weapon: WeaponKind, spec: &MeleeSpec, now: u64) {
    let facing = Vec3::from_yaw(m.yaw);
    let mut best: Option<(PlayerId, f32, f32)> = None;

    for p in world.players.values() {
        if p.id == m.id || !p.is_alive() {
            continue;
        }
        let to_target = (p.position - m.origin).flatten();
        let dist = to_target.length();
        if dist > spec.range {
            continue;
        }
        let dir = if dist > 0.0 { to_target * (1.0 / dist) } else { to_target };
        if dir.dot(facing) < spec.cone_dot {
            continue;
        }
        if best.map_or(true, |(_, d, _)| dist < d) {
            best = Some((p.id, dist, p.yaw));
        }
    }

    let mut shot = m.shot(weapon);
    shot.end = Some(m.origin + facing * MELEE_REACH_FX);

    if let Some((target, _, target_yaw)) = best {
        let target_pos = world.get_player(target).map_or(m.origin, |p| p.position);
        let from_target = (m.origin - target_pos).flatten().normalize();
        let backstab = from_target.dot(Vec3::from_yaw(target_yaw)) < spec.backstab_dot;
        let damage = if backstab { spec.backstab_damage } else { spec.front_damage };

        let outcome = apply_damage(world, Some(m.id), target, damage, now);
        shot.hit = outcome.hit;
        shot.hit_hp = outcome.hit_hp;
        world.push_event(GameEvent::Slash { from: m.id, to: target, backstab });
    }
    world.push_event(GameEvent::Shot(shot));
}

fn fire_minigun(world: &mut World, m: Muzzle, spec: &MinigunSpec, now: u64) {
    let mut empty = false;
    if let Some(power) = world.get_player_mut(m.id).and_then(|p| p.power.as_mut()) {
        power.ammo = power.ammo.saturating_sub(1);
        power.heat = (power.heat + spec.heat_per_shot).clamp(0.0, 1.2);
        if power.heat >= spec.overheat_at {
            power.overheated = true;
        }
        empty = power.ammo == 0;
    }

    let ray = flat_ray(world, m.id, m.origin, m.yaw, spec.range);
    let outcome = match ray.target {
        Some(target) => apply_damage(world, Some(m.id), target, spec.damage, now),
        None => DamageOutcome::MISS,
    };

    let mut shot = m.shot(WeaponKind::Minigun);
    shot.end = Some(Vec3::new(ray.end.x, m.origin.y, ray.end.z));
    shot.hit = outcome.hit;
    shot.hit_hp = outcome.hit_hp;
    world.push_event(GameEvent::Shot(shot));

    // The shooter may have died to their own splash by now; only strip a
    // weapon that is still held.
    let still_held = world.get_player(m.id).is_some_and(|p| p.power.is_some());
    if empty && still_held {
        pickup::strip_empty(world, m.id, now);
    }
}

fn target_distance_xz(world: &World, origin: Vec3, target: PlayerId) -> f32 {
    world.get_player(target).map_or(0.0, |p| p.position.distance_xz(origin))
}

// =============================================================================
// MINIGUN BARREL
// =============================================================================

/// Spin the barrel up while the trigger is held, down otherwise.
///
/// Runs on every input frame, before any cooldown gate.
pub fn update_spin(player: &mut Player, trigger: bool, dt: f32) {
    let Some(power) = player.power.as_mut() else {
        return;
    };
    let spec = MINIGUN_SPEC;
    let delta = if trigger { spec.spin_up_per_sec } else { -spec.spin_down_per_sec };
    power.spin = (power.spin + delta * dt).clamp(0.0, 1.0);
}

/// Let the barrel cool, clearing overheat once below the recovery mark.
pub fn cool_barrel(player: &mut Player, dt: f32) {
    let Some(power) = player.power.as_mut() else {
        return;
    };
    let spec = MINIGUN_SPEC;
    power.heat = (power.heat - spec.cool_per_sec * dt).max(0.0);
    if power.overheated && power.heat <= spec.recover_at {
        power.overheated = false;
    }
}

// =============================================================================
// DEBUG SHOT
// =============================================================================

/// One rifle shot from `shooter` ignoring cooldown and magazine.
///
/// Starts the round if it is sitting in the lobby.
pub fn debug_shot(world: &mut World, shooter: PlayerId, now: u64) -> Result<DamageOutcome, ActionError> {
    let p = world.player(shooter)?;
    let muzzle = Muzzle::of(p);
    let alive = p.is_alive();

    if !world.round.is_started() {
        round::force_start(world, now);
    }
    if !alive {
        return Err(ActionError::Dead);
    }

    let before = world.pending_events().len();
    fire_hitscan(world, muzzle, WeaponKind::Rifle, &RIFLE_HITSCAN, now);

    let outcome = world.pending_events()[before..]
        .iter()
        .rev()
        .find_map(|e| match e {
            GameEvent::Shot(shot) => Some(DamageOutcome {
                hit: shot.hit,
                hit_hp: shot.hit_hp,
                killed: shot.hit_hp == Some(0),
            }),
            _ => None,
        })
        .unwrap_or(DamageOutcome::MISS);
    world.push_event(GameEvent::StateChanged);
    Ok(outcome)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::MapRegistry;
    use crate::game::round::RoundPhase;
    use crate::game::state::{PowerWeapon, MAX_HP};
    use crate::game::tick::MatchConfig;
    use crate::game::weapon::PowerWeaponKind;
    use std::sync::Arc;

    fn arena() -> World {
        let config = MatchConfig { clutch_chance: 0.0, ..MatchConfig::default() };
        let mut w = World::new(config, Arc::new(MapRegistry::builtin()), 3);
        w.round.phase = RoundPhase::Active;
        w
    }

    fn put(w: &mut World, id: PlayerId, x: f32, z: f32, yaw: f32) {
        let p = w.get_player_mut(id).unwrap();
        p.position = Vec3::new(x, GROUND_HEIGHT, z);
        p.yaw = yaw;
        p.pitch = 0.0;
    }

    fn shots(w: &mut World) -> Vec<ShotEvent> {
        w.take_events()
            .into_iter()
            .filter_map(|e| match e {
                GameEvent::Shot(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_rifle_point_blank() {
        let mut w = arena();
        let a = w.add_player("a", 0);
        let b = w.add_player("b", 0);
        put(&mut w, a, 0.0, -15.0, 0.0);
        put(&mut w, b, 0.0, -11.0, 0.0);

        fire(&mut w, a, WeaponKind::Rifle, 1_000).unwrap();
        assert_eq!(w.get_player(b).unwrap().hp, 75);
        assert_eq!(w.get_player(a).unwrap().ammo, 11);

        let shot = &shots(&mut w)[0];
        assert_eq!(shot.hit, Some(b));
        assert_eq!(shot.hit_hp, Some(75));
        assert_eq!(shot.damage, Some(25));
    }

    #[test]
    fn test_rifle_beyond_range_misses() {
        let mut w = arena();
        let a = w.add_player("a", 0);
        let b = w.add_player("b", 0);
        put(&mut w, a, 0.0, -20.0, 0.0);
        put(&mut w, b, 0.0, 15.0, 0.0);

        fire(&mut w, a, WeaponKind::Rifle, 1_000).unwrap();
        assert_eq!(w.get_player(b).unwrap().hp, MAX_HP);
        let shot = &shots(&mut w)[0];
        assert_eq!(shot.hit, None);
        let end = shot.end.unwrap();
        assert!((end.z - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_nearest_target_wins() {
        let mut w = arena();
        let a = w.add_player("a", 0);
        let near = w.add_player("near", 0);
        let far = w.add_player("far", 0);
        put(&mut w, a, -20.0, -20.0, 0.0);
        put(&mut w, far, -20.0, -10.0, 0.0);
        put(&mut w, near, -20.3, -16.0, 0.0);

        fire(&mut w, a, WeaponKind::Rifle, 1_000).unwrap();
        assert!(w.get_player(near).unwrap().hp < MAX_HP);
        assert_eq!(w.get_player(far).unwrap().hp, MAX_HP);
    }

    #[test]
    fn test_cooldown_and_empty_magazine() {
        let mut w = arena();
        let a = w.add_player("a", 0);
        put(&mut w, a, 0.0, -15.0, 0.0);

        fire(&mut w, a, WeaponKind::Rifle, 1_000).unwrap();
        assert_eq!(fire(&mut w, a, WeaponKind::Rifle, 1_250), Err(ActionError::Cooldown));
        fire(&mut w, a, WeaponKind::Rifle, 1_251).unwrap();

        w.get_player_mut(a).unwrap().ammo = 0;
        assert_eq!(fire(&mut w, a, WeaponKind::Rifle, 2_000), Err(ActionError::EmptyMagazine));
        assert_eq!(w.get_player(a).unwrap().reload_until, Some(2_900));
        assert_eq!(fire(&mut w, a, WeaponKind::Rifle, 2_500), Err(ActionError::Reloading));

        w.get_player_mut(a).unwrap().auto_reload = false;
        w.get_player_mut(a).unwrap().reload_until = None;
        assert_eq!(fire(&mut w, a, WeaponKind::Rifle, 4_000), Err(ActionError::EmptyMagazine));
        assert_eq!(w.get_player(a).unwrap().reload_until, None);
    }

    #[test]
    fn test_no_fire_in_lobby() {
        let mut w = arena();
        w.round.phase = RoundPhase::Lobby;
        let a = w.add_player("a", 0);
        assert_eq!(fire(&mut w, a, WeaponKind::Rifle, 1_000), Err(ActionError::RoundNotRunning));
    }

    #[test]
    fn test_invulnerable_target_untouched() {
        let mut w = arena();
        let a = w.add_player("a", 0);
        let b = w.add_player("b", 0);
        put(&mut w, a, 0.0, -15.0, 0.0);
        put(&mut w, b, 0.0, -12.0, 0.0);
        w.get_player_mut(b).unwrap().invuln_until = 5_000;

        fire(&mut w, a, WeaponKind::Rifle, 1_000).unwrap();
        assert_eq!(w.get_player(b).unwrap().hp, MAX_HP);
        assert_eq!(shots(&mut w)[0].hit, None);
    }

    #[test]
    fn test_sniper_headshot_and_body() {
        let mut w = arena();
        let a = w.add_player("a", 0);
        let b = w.add_player("b", 0);
        let c = w.add_player("c", 0);
        put(&mut w, a, -20.0, -20.0, 0.0);
        put(&mut w, b, -20.0, -5.0, 0.0);
        put(&mut w, c, 20.0, 20.0, 0.0);

        // Aim over the torso sphere into the top of the head, 15 units out
        w.get_player_mut(a).unwrap().pitch = -(1.05f32 / 15.0).atan();
        fire(&mut w, a, WeaponKind::Sniper, 1_000).unwrap();
        assert_eq!(w.get_player(b).unwrap().hp, 0);
        assert_eq!(shots(&mut w)[0].part, Some(HitPart::Head));

        // Level shot through the torso
        put(&mut w, c, -20.0, -5.0, 0.0);
        w.get_player_mut(a).unwrap().pitch = 0.0;
        fire(&mut w, a, WeaponKind::Sniper, 3_000).unwrap();
        assert_eq!(w.get_player(c).unwrap().hp, 50);
    }

    #[test]
    fn test_knife_front_and_backstab() {
        let mut w = arena();
        let a = w.add_player("a", 0);
        let b = w.add_player("b", 0);
        put(&mut w, a, -20.0, -20.0, 0.0);

        // Target faces the attacker
        put(&mut w, b, -20.0, -18.5, std::f32::consts::PI);
        fire(&mut w, a, WeaponKind::Knife, 1_000).unwrap();
        assert_eq!(w.get_player(b).unwrap().hp, 65);
        assert_eq!(w.get_player(a).unwrap().ammo, 12);

        // Target faces away
        put(&mut w, b, -20.0, -18.5, 0.0);
        fire(&mut w, a, WeaponKind::Knife, 2_000).unwrap();
        assert_eq!(w.get_player(b).unwrap().hp, 0);
        let events = w.take_events();
        assert!(events.iter().any(|e| matches!(e, GameEvent::Slash { backstab: true, .. })));
    }

    #[test]
    fn test_rocket_splash_spares_shooter() {
        let mut w = arena();
        let a = w.add_player("a", 0);
        let b = w.add_player("b", 0);
        let c = w.add_player("c", 0);
        put(&mut w, a, -20.0, -20.0, 0.0);
        put(&mut w, b, -20.0, -10.0, 0.0);
        put(&mut w, c, -17.0, -10.0, 0.0);

        fire(&mut w, a, WeaponKind::Rocket, 1_000).unwrap();
        assert_eq!(w.get_player(b).unwrap().hp, 0);
        // Three units from the blast: capped splash
        assert_eq!(w.get_player(c).unwrap().hp, 10);
        assert_eq!(w.get_player(a).unwrap().hp, MAX_HP);
    }

    #[test]
    fn test_status_applies_debuff_only() {
        let mut w = arena();
        let a = w.add_player("a", 0);
        let b = w.add_player("b", 0);
        put(&mut w, a, -20.0, -20.0, 0.0);
        put(&mut w, b, -20.0, -10.0, 0.0);

        fire(&mut w, a, WeaponKind::Fart, 1_000).unwrap();
        let victim = w.get_player(b).unwrap();
        assert_eq!(victim.hp, MAX_HP);
        assert_eq!(victim.status.unwrap().until, 6_000);
    }

    #[test]
    fn test_shotgun_aggregates_pellets() {
        let mut w = arena();
        let a = w.add_player("a", 0);
        let b = w.add_player("b", 0);
        put(&mut w, a, -20.0, -20.0, 0.0);
        put(&mut w, b, -20.0, -18.0, 0.0);

        fire(&mut w, a, WeaponKind::Shotgun, 1_000).unwrap();
        let shots = shots(&mut w);
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].traces.len(), 6);
        // Point blank: every pellet connects for full damage
        assert_eq!(w.get_player(b).unwrap().hp, 40);
    }

    #[test]
    fn test_clutch_save() {
        let config = MatchConfig { clutch_chance: 1.0, ..MatchConfig::default() };
        let mut w = World::new(config, Arc::new(MapRegistry::builtin()), 3);
        w.round.phase = RoundPhase::Active;
        let a = w.add_player("a", 0);
        let b = w.add_player("b", 0);

        let outcome = apply_damage(&mut w, Some(a), b, 999, 0);
        assert_eq!(outcome, DamageOutcome { hit: Some(b), hit_hp: Some(1), killed: false });
        // Already at 1 HP: no second save
        let outcome = apply_damage(&mut w, Some(a), b, 5, 0);
        assert!(outcome.killed);
    }

    #[test]
    fn test_kill_bonuses() {
        let mut w = arena();
        let a = w.add_player("a", 0);
        let b = w.add_player("b", 0);
        let c = w.add_player("c", 0);

        // First blood
        apply_damage(&mut w, Some(a), b, 999, 1_000);
        assert_eq!(w.get_player(a).unwrap().score, 2);

        // Streak within the window
        apply_damage(&mut w, Some(a), c, 999, 2_000);
        assert_eq!(w.get_player(a).unwrap().score, 4);

        // Revenge for b, after a long gap
        w.get_player_mut(b).unwrap().hp = MAX_HP;
        w.get_player_mut(a).unwrap().invuln_until = 0;
        apply_damage(&mut w, Some(b), a, 999, 20_000);
        assert_eq!(w.get_player(b).unwrap().score, 2);
        assert_eq!(w.get_player(a).unwrap().deaths, 1);
    }

    #[test]
    fn test_self_kill_scores_nothing() {
        let mut w = arena();
        let a = w.add_player("a", 0);
        apply_damage(&mut w, Some(a), a, 999, 1_000);
        let p = w.get_player(a).unwrap();
        assert_eq!(p.score, 0);
        assert_eq!(p.deaths, 1);
        assert_eq!(p.respawn_at, Some(3_000));
        assert!(!w.round.first_blood);
    }

    #[test]
    fn test_minigun_spin_gating() {
        let mut w = arena();
        let a = w.add_player("a", 0);
        put(&mut w, a, -20.0, -20.0, 0.0);
        w.get_player_mut(a).unwrap().power = Some(PowerWeapon::new(PowerWeaponKind::Minigun));

        // 0.2 / 6.0 = 33 ms of trigger before the first round
        let mut now = 1_000;
        update_spin(w.get_player_mut(a).unwrap(), true, 0.016);
        assert!(matches!(
            fire(&mut w, a, WeaponKind::Rifle, now),
            Err(ActionError::MinigunNotReady(_))
        ));
        now += 16;
        update_spin(w.get_player_mut(a).unwrap(), true, 0.016);
        assert!(fire(&mut w, a, WeaponKind::Rifle, now).is_err());

        now += 16;
        update_spin(w.get_player_mut(a).unwrap(), true, 0.016);
        fire(&mut w, a, WeaponKind::Rifle, now).unwrap();
        let power = w.get_player(a).unwrap().power.clone().unwrap();
        assert_eq!(power.ammo, 449);
        assert_eq!(shots(&mut w).last().unwrap().weapon, WeaponKind::Minigun);
        // Magazine untouched by the power weapon
        assert_eq!(w.get_player(a).unwrap().ammo, 12);
    }

    #[test]
    fn test_minigun_overheat_and_recovery() {
        let mut w = arena();
        let a = w.add_player("a", 0);
        put(&mut w, a, -20.0, -20.0, 0.0);
        let mut power = PowerWeapon::new(PowerWeaponKind::Minigun);
        power.spin = 1.0;
        power.heat = 0.999;
        w.get_player_mut(a).unwrap().power = Some(power);

        fire(&mut w, a, WeaponKind::Minigun, 1_000).unwrap();
        assert!(w.get_player(a).unwrap().power.as_ref().unwrap().overheated);
        assert!(matches!(
            fire(&mut w, a, WeaponKind::Minigun, 1_100),
            Err(ActionError::MinigunNotReady("overheated"))
        ));

        // Shedding 0.75 of heat at 0.4 per second takes 29 ticks
        for _ in 0..28 {
            cool_barrel(w.get_player_mut(a).unwrap(), 1.0 / 15.0);
        }
        assert!(w.get_player(a).unwrap().power.as_ref().unwrap().overheated);
        cool_barrel(w.get_player_mut(a).unwrap(), 1.0 / 15.0);
        assert!(!w.get_player(a).unwrap().power.as_ref().unwrap().overheated);
    }

    #[test]
    fn test_minigun_last_round_strips_weapon() {
        let mut w = arena();
        let a = w.add_player("a", 0);
        put(&mut w, a, 0.0, 0.5, 0.0);
        let mut power = PowerWeapon::new(PowerWeaponKind::Minigun);
        power.spin = 1.0;
        power.ammo = 1;
        w.get_player_mut(a).unwrap().power = Some(power);
        w.pads[0].held_by = Some(a);

        fire(&mut w, a, WeaponKind::Minigun, 1_000).unwrap();
        assert!(w.get_player(a).unwrap().power.is_none());
        assert_eq!(w.pads[0].held_by, None);
        assert_eq!(w.pads[0].available_at, 31_000);
        let events = w.take_events();
        assert!(events.iter().any(|e| matches!(e, GameEvent::MinigunEmpty { .. })));
    }

    #[test]
    fn test_death_drops_minigun() {
        let mut w = arena();
        let a = w.add_player("a", 0);
        let b = w.add_player("b", 0);
        w.get_player_mut(b).unwrap().power = Some(PowerWeapon::new(PowerWeaponKind::Minigun));

        apply_damage(&mut w, Some(a), b, 999, 1_000);
        assert!(w.get_player(b).unwrap().power.is_none());
        assert_eq!(w.drops.len(), 1);
        assert_eq!(w.drops[0].expires_at, 9_000);
    }

    #[test]
    fn test_debug_shot_starts_round() {
        let mut w = arena();
        w.round.phase = RoundPhase::Lobby;
        let a = w.add_player("a", 0);
        let b = w.add_player("b", 0);
        put(&mut w, a, -20.0, -20.0, 0.0);
        put(&mut w, b, -20.0, -17.0, 0.0);

        let outcome = debug_shot(&mut w, a, 1_000).unwrap();
        assert!(w.round.is_active());
        assert_eq!(outcome.hit, Some(b));
        assert_eq!(outcome.hit_hp, Some(75));
        // Cooldown and magazine untouched
        assert_eq!(w.get_player(a).unwrap().ammo, 12);
        assert_eq!(w.get_player(a).unwrap().last_shot_at, None);
    }
}
