//! Pickup Economy
//!
//! Power weapons come from two places: fixed pads defined by the map, and a
//! single ephemeral drop slot per weapon kind created when a carrier dies or
//! lets go. A pad remembers who borrowed its weapon; a periodic pass releases
//! pads whose holder vanished or no longer carries the weapon.

use crate::game::events::GameEvent;
use crate::game::map::Map;
use crate::game::state::{drop_id, ActionError, PickupPad, PlayerId, PowerWeapon, World, WorldDrop};
use crate::game::weapon::PowerWeaponKind;

/// Fresh pads for `map`, all immediately available.
pub fn build_pads(map: &Map) -> Vec<PickupPad> {
    map.pickup_pads
        .iter()
        .map(|t| PickupPad {
            id: t.id.clone(),
            kind: t.kind,
            position: crate::core::vec3::Vec3::new(t.x, t.y, t.z),
            held_by: None,
            available_at: 0,
        })
        .collect()
}

/// Claim the pad or drop named `pickup_id`.
pub fn try_pickup(world: &mut World, id: PlayerId, pickup_id: &str, now: u64) -> Result<(), ActionError> {
    if !world.round.is_started() {
        return Err(ActionError::RoundNotRunning);
    }
    let player = world.player(id)?;
    if !player.is_alive() {
        return Err(ActionError::Dead);
    }
    if player.power.is_some() {
        return Err(ActionError::AlreadyArmed);
    }
    let position = player.position;

    if let Some(index) = world.drops.iter().position(|d| d.id() == pickup_id) {
        let drop = &world.drops[index];
        if position.distance_xz(drop.position) > world.config.drop_pickup_radius {
            return Err(ActionError::OutOfRange(pickup_id.to_string()));
        }
        if now >= drop.expires_at {
            return Err(ActionError::PickupUnavailable(pickup_id.to_string()));
        }
        let kind = world.drops.remove(index).kind;
        grant(world, id, kind);
        return Ok(());
    }

    let radius = world.config.pad_pickup_radius;
    let pad = world
        .pads
        .iter_mut()
        .find(|p| p.id == pickup_id)
        .ok_or_else(|| ActionError::UnknownPickup(pickup_id.to_string()))?;
    if position.distance_xz(pad.position) > radius {
        return Err(ActionError::OutOfRange(pickup_id.to_string()));
    }
    if !pad.is_available(now) {
        return Err(ActionError::PickupUnavailable(pickup_id.to_string()));
    }
    pad.held_by = Some(id);
    let kind = pad.kind;
    grant(world, id, kind);
    Ok(())
}

fn grant(world: &mut World, id: PlayerId, kind: PowerWeaponKind) {
    if let Some(player) = world.get_player_mut(id) {
        player.power = Some(PowerWeapon::new(kind));
    }
    world.push_event(GameEvent::Pickup { player: id, what: kind });
    world.push_event(GameEvent::StateChanged);
}

/// Voluntarily drop the carried power weapon where the player stands.
pub fn drop_power_weapon(world: &mut World, id: PlayerId, now: u64) -> Result<(), ActionError> {
    let player = world.player_mut(id)?;
    let power = player.power.take().ok_or(ActionError::NoPowerWeapon)?;
    let position = player.position;
    let pad_available_at = now + world.config.pad_drop_cooldown_ms;
    let expires_at = now + world.config.voluntary_drop_lifetime_ms;

    release_pads_held_by(world, id, pad_available_at);
    place_drop(world, WorldDrop { kind: power.kind, position, expires_at });
    world.push_event(GameEvent::StateChanged);
    Ok(())
}

/// Strip a dying player's power weapon, leaving it on the floor if it still
/// has ammo.
pub fn drop_on_death(world: &mut World, id: PlayerId, now: u64) {
    let Some(player) = world.get_player_mut(id) else {
        return;
    };
    let Some(power) = player.power.take() else {
        return;
    };
    let position = player.position;
    let pad_available_at = now + world.config.pad_drop_cooldown_ms;
    let expires_at = now + world.config.death_drop_lifetime_ms;

    release_pads_held_by(world, id, pad_available_at);
    if power.ammo > 0 {
        place_drop(world, WorldDrop { kind: power.kind, position, expires_at });
    }
}

/// Remove an empty power weapon from its carrier.
pub fn strip_empty(world: &mut World, id: PlayerId, now: u64) {
    if let Some(player) = world.get_player_mut(id) {
        player.power = None;
    }
    let pad_available_at = now + world.config.pad_drop_cooldown_ms;
    release_pads_held_by(world, id, pad_available_at);
    world.push_event(GameEvent::MinigunEmpty { player: id });
    world.push_event(GameEvent::StateChanged);
}

/// Put a drop in its kind's slot, replacing any older drop of that kind.
pub fn place_drop(world: &mut World, drop: WorldDrop) {
    world.drops.retain(|d| d.kind != drop.kind);
    world.drops.push(drop);
}

/// Free every pad `id` holds; they become claimable at `available_at`.
pub fn release_pads_held_by(world: &mut World, id: PlayerId, available_at: u64) {
    for pad in world.pads.iter_mut().filter(|p| p.held_by == Some(id)) {
        pad.held_by = None;
        pad.available_at = available_at;
    }
}

/// Remove drops whose lifetime is over.
pub fn expire_drops(world: &mut World, now: u64) {
    world.drops.retain(|d| now < d.expires_at);
}

/// Release pads whose holder is gone or no longer carries the pad's weapon.
pub fn reconcile_pads(world: &mut World, now: u64) {
    let cooldown = world.config.pad_release_cooldown_ms;
    for pad in world.pads.iter_mut() {
        let Some(holder) = pad.held_by else {
            continue;
        };
        let still_held = world
            .players
            .get(&holder)
            .is_some_and(|p| p.power_kind() == Some(pad.kind));
        if !still_held {
            tracing::debug!(pad = %pad.id, holder = %holder, "releasing stale pad hold");
            pad.held_by = None;
            pad.available_at = now + cooldown;
        }
    }
}

/// Id of the drop slot for `kind`, if a drop currently occupies it.
pub fn active_drop_id(world: &World, kind: PowerWeaponKind) -> Option<String> {
    world.drops.iter().any(|d| d.kind == kind).then(|| drop_id(kind))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec3::Vec3;
    use crate::game::map::MapRegistry;
    use crate::game::round::RoundPhase;
    use crate::game::tick::MatchConfig;
    use std::sync::Arc;

    fn active_world() -> World {
        let mut w = World::new(MatchConfig::default(), Arc::new(MapRegistry::builtin()), 1);
        w.round.phase = RoundPhase::Active;
        w
    }

    fn place(w: &mut World, id: PlayerId, x: f32, z: f32) {
        w.get_player_mut(id).unwrap().position = Vec3::new(x, 1.8, z);
    }

    #[test]
    fn test_pad_pickup_and_exclusivity() {
        let mut w = active_world();
        let a = w.add_player("a", 0);
        let b = w.add_player("b", 0);
        place(&mut w, a, 0.5, 0.0);
        place(&mut w, b, -0.5, 0.0);

        try_pickup(&mut w, a, "pad_mg_1", 100).unwrap();
        assert_eq!(w.pads[0].held_by, Some(a));
        assert_eq!(w.get_player(a).unwrap().power.as_ref().unwrap().ammo, 450);

        let err = try_pickup(&mut w, b, "pad_mg_1", 100).unwrap_err();
        assert_eq!(err, ActionError::PickupUnavailable("pad_mg_1".into()));
        assert!(w.get_player(b).unwrap().power.is_none());
    }

    #[test]
    fn test_pad_cooldown_after_drop() {
        let mut w = active_world();
        let a = w.add_player("a", 0);
        let b = w.add_player("b", 0);
        place(&mut w, a, 0.5, 0.0);
        place(&mut w, b, -0.5, 0.0);

        try_pickup(&mut w, a, "pad_mg_1", 100).unwrap();
        drop_power_weapon(&mut w, a, 1_000).unwrap();

        assert_eq!(w.pads[0].held_by, None);
        assert!(try_pickup(&mut w, b, "pad_mg_1", 30_999).is_err());
        // The voluntary drop is still claimable meanwhile
        assert_eq!(active_drop_id(&w, PowerWeaponKind::Minigun).as_deref(), Some("drop_minigun"));
        try_pickup(&mut w, b, "drop_minigun", 2_000).unwrap();
        assert!(w.drops.is_empty());

        let c = w.add_player("c", 0);
        place(&mut w, c, 0.0, 0.5);
        assert!(try_pickup(&mut w, c, "pad_mg_1", 30_999).is_err());
        try_pickup(&mut w, c, "pad_mg_1", 31_000).unwrap();
    }

    #[test]
    fn test_pickup_requires_proximity_and_round() {
        let mut w = active_world();
        let a = w.add_player("a", 0);
        place(&mut w, a, 5.0, 5.0);
        assert_eq!(
            try_pickup(&mut w, a, "pad_mg_1", 0),
            Err(ActionError::OutOfRange("pad_mg_1".into()))
        );
        assert_eq!(
            try_pickup(&mut w, a, "nope", 0),
            Err(ActionError::UnknownPickup("nope".into()))
        );

        w.round.phase = RoundPhase::Lobby;
        place(&mut w, a, 0.0, 0.0);
        assert_eq!(try_pickup(&mut w, a, "pad_mg_1", 0), Err(ActionError::RoundNotRunning));
    }

    #[test]
    fn test_death_drop_expires() {
        let mut w = active_world();
        let a = w.add_player("a", 0);
        place(&mut w, a, 0.0, 0.0);
        try_pickup(&mut w, a, "pad_mg_1", 0).unwrap();

        drop_on_death(&mut w, a, 1_000);
        assert!(w.get_player(a).unwrap().power.is_none());
        assert_eq!(w.drops.len(), 1);
        assert_eq!(w.pads[0].available_at, 31_000);

        expire_drops(&mut w, 8_999);
        assert_eq!(w.drops.len(), 1);
        expire_drops(&mut w, 9_000);
        assert!(w.drops.is_empty());
    }

    #[test]
    fn test_reconcile_releases_stale_holds() {
        let mut w = active_world();
        let a = w.add_player("a", 0);
        place(&mut w, a, 0.0, 0.0);
        try_pickup(&mut w, a, "pad_mg_1", 0).unwrap();

        reconcile_pads(&mut w, 10);
        assert_eq!(w.pads[0].held_by, Some(a));

        // Weapon vanished without going through a drop path
        w.get_player_mut(a).unwrap().power = None;
        reconcile_pads(&mut w, 20);
        assert_eq!(w.pads[0].held_by, None);
        assert_eq!(w.pads[0].available_at, 15_020);
    }

    #[test]
    fn test_single_drop_slot() {
        let mut w = active_world();
        for (x, t) in [(1.0, 100), (2.0, 200)] {
            place_drop(
                &mut w,
                WorldDrop { kind: PowerWeaponKind::Minigun, position: Vec3::new(x, 1.8, 0.0), expires_at: t },
            );
        }
        assert_eq!(w.drops.len(), 1);
        assert_eq!(w.drops[0].position.x, 2.0);
    }
}
