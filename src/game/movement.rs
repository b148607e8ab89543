//! Movement and Collision
//!
//! Applies one input frame to one player's kinematic state. Horizontal motion
//! is resolved one axis at a time against the map's obstacle boxes, grown by
//! the player radius, so players slide along walls instead of sticking.
//! Vertical motion is a separate gravity integrator over a flat floor.

use crate::core::vec3::Vec3;
use crate::game::input::PlayerInput;
use crate::game::map::Map;
use crate::game::state::{Player, GROUND_HEIGHT};

/// Collision radius of a player on the floor plane.
pub const PLAYER_RADIUS: f32 = 0.7;

/// Walking speed, units per second.
pub const WALK_SPEED: f32 = 8.0;

/// Sprinting speed, units per second.
pub const SPRINT_SPEED: f32 = 11.5;

/// Vertical acceleration, units per second squared.
pub const GRAVITY: f32 = -18.0;

/// Upward velocity of a jump.
pub const JUMP_VELOCITY: f32 = 7.5;

const GROUND_EPSILON: f32 = 1e-3;

/// Apply a sanitized input frame to `player` on `map`.
///
/// The caller rejects dead players before getting here.
pub fn apply_movement(player: &mut Player, map: &Map, input: &PlayerInput) {
    let dt = input.frame_dt();
    let yaw = input.yaw.unwrap_or(player.yaw);
    let speed = if input.sprint { SPRINT_SPEED } else { WALK_SPEED };

    let forward = Vec3::from_yaw(yaw);
    let right = Vec3::new(yaw.cos(), 0.0, -yaw.sin());
    let step = (right * input.move_x + forward * input.move_z) * (speed * dt);

    let (x_try, z_try) = map.bounds.clamp(player.position.x + step.x, player.position.z + step.z);

    // X first, then Z against the possibly updated X
    if !map.collides(x_try, player.position.z, PLAYER_RADIUS) {
        player.position.x = x_try;
    }
    if !map.collides(player.position.x, z_try, PLAYER_RADIUS) {
        player.position.z = z_try;
    }

    player.yaw = yaw;
    if let Some(pitch) = input.pitch {
        player.pitch = pitch;
    }

    let on_ground = player.position.y <= GROUND_HEIGHT + GROUND_EPSILON;
    if input.jump && on_ground {
        player.vy = JUMP_VELOCITY;
    }
    player.vy += GRAVITY * dt;
    player.position.y += player.vy * dt;
    if player.position.y < GROUND_HEIGHT {
        player.position.y = GROUND_HEIGHT;
        player.vy = 0.0;
    }
}

// =============================================================================
// TESTS
// =============================================================================
