//! Grenade projectiles: spawn on throw, integrate per tick, detonate on fuse
//! or (impact variant) on an armed ground contact.

use crate::core::vec3::Vec3;
use crate::game::combat;
use crate::game::events::GameEvent;
use crate::game::movement::GRAVITY;
use crate::game::state::{Grenade, PlayerId, World, GROUND_HEIGHT};
use crate::game::weapon::{GrenadeSpec, WeaponBehavior, WeaponKind};

/// Launch speed along the look direction.
pub const THROW_SPEED: f32 = 16.0;

/// Extra upward velocity added to every throw.
pub const THROW_LIFT: f32 = 3.5;

/// Grenades leave the hand slightly above eye level.
const SPAWN_LIFT: f32 = 0.2;

/// Below this vertical speed a ground contact stops the bounce.
const MIN_BOUNCE_SPEED: f32 = 1.4;

/// Horizontal damping per ground contact.
const GROUND_FRICTION: f32 = 0.94;

fn spec_of(kind: WeaponKind) -> Option<GrenadeSpec> {
    match kind.def().behavior {
        WeaponBehavior::Grenade(spec) => Some(spec),
        _ => None,
    }
}

/// Unit throw direction. Positive pitch throws upward, the opposite of
/// `Vec3::from_yaw_pitch`.
pub fn throw_direction(yaw: f32, pitch: f32) -> Vec3 {
    let cos_p = pitch.cos();
    Vec3::new(yaw.sin() * cos_p, pitch.sin(), yaw.cos() * cos_p)
}

/// Throw a grenade from `owner`'s eye along their look direction.
pub fn spawn_grenade(world: &mut World, owner: PlayerId, kind: WeaponKind, spec: &GrenadeSpec, now: u64) -> Option<u32> {
    let (position, velocity) = {
        let p = world.get_player(owner)?;
        let dir = throw_direction(p.yaw, p.pitch);
        (
            p.position + Vec3::new(0.0, SPAWN_LIFT, 0.0),
            dir * THROW_SPEED + Vec3::new(0.0, THROW_LIFT, 0.0),
        )
    };

    let id = world.next_grenade_id();
    let fuse_at = now + spec.fuse_ms;
    let arm_at = now + spec.arm_ms;
    world.grenades.push(Grenade {
        id,
        kind,
        owner,
        position,
        velocity,
        spawned_at: now,
        fuse_at,
        arm_at,
        exploded: false,
    });
    world.push_event(GameEvent::GrenadeSpawn { id, kind, owner, position, velocity, fuse_at, arm_at });
    Some(id)
}

/// Advance every live grenade by `dt` seconds and detonate the ones that are
/// due. Detonated grenades are removed.
pub fn step_grenades(world: &mut World, now: u64, dt: f32) {
    let bounds = world.active_map().bounds;
    let mut detonations: Vec<(PlayerId, GrenadeSpec, Vec3)> = Vec::new();

    for g in world.grenades.iter_mut().filter(|g| !g.exploded) {
        let Some(spec) = spec_of(g.kind) else {
            g.exploded = true;
            continue;
        };

        if now >= g.fuse_at {
            g.exploded = true;
            detonations.push((g.owner, spec, g.position));
            continue;
        }

        g.velocity.y += GRAVITY * dt;
        g.position = g.position + g.velocity * dt;

        if g.position.x < bounds.min_x || g.position.x > bounds.max_x {
            g.position.x = g.position.x.clamp(bounds.min_x, bounds.max_x);
            g.velocity.x = -g.velocity.x * spec.bounce;
        }
        if g.position.z < bounds.min_z || g.position.z > bounds.max_z {
            g.position.z = g.position.z.clamp(bounds.min_z, bounds.max_z);
            g.velocity.z = -g.velocity.z * spec.bounce;
        }

        if g.position.y <= GROUND_HEIGHT {
            g.position.y = GROUND_HEIGHT;
            g.velocity.y = if g.velocity.y.abs() > MIN_BOUNCE_SPEED {
                g.velocity.y.abs() * spec.bounce
            } else {
                0.0
            };
            g.velocity.x *= GROUND_FRICTION;
            g.velocity.z *= GROUND_FRICTION;

            if spec.impact && now >= g.arm_at {
                g.exploded = true;
                detonations.push((g.owner, spec, g.position));
            }
        }
    }
    world.grenades.retain(|g| !g.exploded);

    for (owner, spec, at) in detonations {
        detonate(world, owner, &spec, at, now);
    }
}

/// Radial blast at `at`. The thrower is hurt like anyone else; a thrower who
/// has left the match gets no credit.
fn detonate(world: &mut World, owner: PlayerId, spec: &GrenadeSpec, at: Vec3, now: u64) {
    let shooter = world.get_player(owner).map(|p| p.id);
    let victims: Vec<(PlayerId, i32)> = world
        .players
        .values()
        .filter(|p| p.is_alive())
        .filter_map(|p| spec.damage_at(p.position.distance(at)).map(|d| (p.id, d)))
        .collect();

    for (target, damage) in victims {
        combat::apply_damage(world, shooter, target, damage, now);
    }
    world.push_event(GameEvent::Explosion { grenade: true, position: at, radius: spec.radius });
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::MapRegistry;
    use crate::game::round::RoundPhase;
    use crate::game::state::MAX_HP;
    use crate::game::tick::MatchConfig;
    use crate::game::weapon::{GRENADE_FRAG, GRENADE_IMPACT};
    use std::sync::Arc;

    const DT: f32 = 1.0 / 15.0;

    fn world() -> World {
        let config = MatchConfig { clutch_chance: 0.0, ..MatchConfig::default() };
        let mut w = World::new(config, Arc::new(MapRegistry::builtin()), 5);
        w.round.phase = RoundPhase::Active;
        w
    }

    fn spec(def: &crate::game::weapon::WeaponDef) -> GrenadeSpec {
        match def.behavior {
            WeaponBehavior::Grenade(spec) => spec,
            _ => unreachable!(),
        }
    }

    fn explosions(w: &mut World) -> usize {
        w.take_events()
            .iter()
            .filter(|e| matches!(e, GameEvent::Explosion { grenade: true, .. }))
            .count()
    }

    #[test]
    fn test_frag_detonates_exactly_at_fuse() {
        let mut w = world();
        let a = w.add_player("a", 0);
        spawn_grenade(&mut w, a, WeaponKind::GrenadeFrag, &spec(&GRENADE_FRAG), 1_000).unwrap();
        w.take_events();

        let mut now = 1_000;
        while now + 66 < 2_199 {
            now += 66;
            step_grenades(&mut w, now, DT);
        }
        step_grenades(&mut w, 2_199, DT);
        assert_eq!(w.grenades.len(), 1);
        assert_eq!(explosions(&mut w), 0);

        step_grenades(&mut w, 2_200, DT);
        assert!(w.grenades.is_empty());
        assert_eq!(explosions(&mut w), 1);
    }

    #[test]
    fn test_impact_waits_for_arm() {
        let mut w = world();
        let a = w.add_player("a", 0);
        // Throw hard at the floor so the first contact lands before arming
        w.get_player_mut(a).unwrap().pitch = -1.2;
        spawn_grenade(&mut w, a, WeaponKind::GrenadeImpact, &spec(&GRENADE_IMPACT), 0).unwrap();

        step_grenades(&mut w, 66, DT);
        assert_eq!(w.grenades.len(), 1, "detonated before arming");

        let mut now = 66;
        while !w.grenades.is_empty() {
            now += 66;
            step_grenades(&mut w, now, DT);
            assert!(now < 2_500, "never detonated on contact");
        }
        assert!(now >= 180);
    }

    #[test]
    fn test_positive_pitch_throws_upward() {
        let mut w = world();
        let a = w.add_player("a", 0);
        w.get_player_mut(a).unwrap().pitch = 0.5;
        spawn_grenade(&mut w, a, WeaponKind::GrenadeFrag, &spec(&GRENADE_FRAG), 0).unwrap();
        let vy = w.grenades[0].velocity.y;
        assert!(vy > THROW_LIFT);
        assert!((vy - (THROW_SPEED * 0.5f32.sin() + THROW_LIFT)).abs() < 1e-4);

        w.get_player_mut(a).unwrap().pitch = -0.5;
        spawn_grenade(&mut w, a, WeaponKind::GrenadeFrag, &spec(&GRENADE_FRAG), 0).unwrap();
        assert!(w.grenades[1].velocity.y < THROW_LIFT);
    }

    #[test]
    fn test_blast_damage_and_self_damage() {
        let mut w = world();
        let a = w.add_player("a", 0);
        let b = w.add_player("b", 0);
        let c = w.add_player("c", 0);
        let at = Vec3::new(-20.0, GROUND_HEIGHT, -20.0);
        w.get_player_mut(a).unwrap().position = at;
        w.get_player_mut(b).unwrap().position = Vec3::new(-17.0, GROUND_HEIGHT, -20.0);
        w.get_player_mut(c).unwrap().position = Vec3::new(10.0, GROUND_HEIGHT, 10.0);

        detonate(&mut w, a, &spec(&GRENADE_FRAG), at, 500);
        // Thrower at the center takes full damage, b at half radius takes half
        assert_eq!(w.get_player(a).unwrap().hp, 0);
        assert_eq!(w.get_player(b).unwrap().hp, 50);
        assert_eq!(w.get_player(c).unwrap().hp, MAX_HP);
        // Dying to your own grenade scores nothing
        assert_eq!(w.get_player(a).unwrap().score, 0);
    }

    #[test]
    fn test_bounces_off_bounds() {
        let mut w = world();
        let a = w.add_player("a", 0);
        {
            let p = w.get_player_mut(a).unwrap();
            p.position = Vec3::new(24.5, GROUND_HEIGHT, 0.0);
            p.yaw = std::f32::consts::FRAC_PI_2;
        }
        spawn_grenade(&mut w, a, WeaponKind::GrenadeFrag, &spec(&GRENADE_FRAG), 0).unwrap();
        step_grenades(&mut w, 66, DT);

        let g = &w.grenades[0];
        assert!(g.position.x <= 25.0);
        assert!(g.velocity.x < 0.0);
    }
}
