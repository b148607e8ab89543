//! Game Events
//!
//! Discrete notifications produced while resolving inputs and ticks. The world
//! collects them in order; the network layer drains them after each operation
//! and turns them into broadcasts.

use crate::core::vec3::Vec3;
use crate::game::state::PlayerId;
use crate::game::weapon::{PowerWeaponKind, WeaponKind};

/// Which sphere a 3D ray struck.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HitPart {
    Head,
    Body,
}

/// One shotgun pellet trace.
#[derive(Clone, Debug, PartialEq)]
pub struct PelletTrace {
    pub end: Vec3,
    pub hit: Option<PlayerId>,
}

/// Everything clients need to draw a fire action.
#[derive(Clone, Debug, PartialEq)]
pub struct ShotEvent {
    pub weapon: WeaponKind,
    pub from: PlayerId,
    pub origin: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    /// Tracer end point; absent for pellet weapons
    pub end: Option<Vec3>,
    pub hit: Option<PlayerId>,
    pub hit_hp: Option<i32>,
    /// Damage after falloff (rifle only)
    pub damage: Option<i32>,
    pub part: Option<HitPart>,
    pub traces: Vec<PelletTrace>,
}

/// Score bonus and survival toasts.
#[derive(Clone, Debug, PartialEq)]
pub enum Toast {
    Clutch { player: PlayerId },
    Streak { player: PlayerId, count: u32 },
    FirstBlood { player: PlayerId },
    Revenge { player: PlayerId, against: PlayerId },
}

/// Game event data.
#[derive(Clone, Debug, PartialEq)]
pub enum GameEvent {
    /// A weapon was fired
    Shot(ShotEvent),

    /// A knife connected
    Slash { from: PlayerId, to: PlayerId, backstab: bool },

    /// A player died. `killer` is `None` for damage over time.
    Kill {
        killer: Option<(PlayerId, String)>,
        victim: PlayerId,
        victim_name: String,
    },

    /// The round ended
    Winner { winner: Option<(PlayerId, String)> },

    /// Rocket impact or grenade detonation
    Explosion { grenade: bool, position: Vec3, radius: f32 },

    /// A grenade left someone's hand
    GrenadeSpawn {
        id: u32,
        kind: WeaponKind,
        owner: PlayerId,
        position: Vec3,
        velocity: Vec3,
        fuse_at: u64,
        arm_at: u64,
    },

    /// A power weapon was picked up
    Pickup { player: PlayerId, what: PowerWeaponKind },

    /// The minigun ran dry and was stripped
    MinigunEmpty { player: PlayerId },

    Toast(Toast),

    /// A status debuff was applied
    StatusApplied { from: PlayerId, to: PlayerId, until: u64 },

    /// Damage over time ticked
    StatusTick { to: PlayerId, damage: i32 },

    /// Reload started
    ReloadStarted { player: PlayerId, position: Vec3 },

    /// Player was removed for inactivity
    Leave { player: PlayerId },

    /// Something visible changed outside the regular tick broadcast
    StateChanged,
}

impl GameEvent {
    /// Player the event is primarily about, if any.
    pub fn player(&self) -> Option<PlayerId> {
        match self {
            GameEvent::Shot(shot) => Some(shot.from),
            GameEvent::Slash { from, .. } => Some(*from),
            GameEvent::Kill { victim, .. } => Some(*victim),
            GameEvent::Winner { winner } => winner.as_ref().map(|(id, _)| *id),
            GameEvent::GrenadeSpawn { owner, .. } => Some(*owner),
            GameEvent::Pickup { player, .. }
            | GameEvent::MinigunEmpty { player }
            | GameEvent::ReloadStarted { player, .. }
            | GameEvent::Leave { player } => Some(*player),
            GameEvent::StatusApplied { to, .. } | GameEvent::StatusTick { to, .. } => Some(*to),
            GameEvent::Toast(toast) => Some(match toast {
                Toast::Clutch { player }
                | Toast::Streak { player, .. }
                | Toast::FirstBlood { player }
                | Toast::Revenge { player, .. } => *player,
            }),
            GameEvent::Explosion { .. } | GameEvent::StateChanged => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_player() {
        let kill = GameEvent::Kill {
            killer: None,
            victim: PlayerId(3),
            victim_name: "Hunter".into(),
        };
        assert_eq!(kill.player(), Some(PlayerId(3)));

        let toast = GameEvent::Toast(Toast::Revenge { player: PlayerId(1), against: PlayerId(2) });
        assert_eq!(toast.player(), Some(PlayerId(1)));

        assert_eq!(GameEvent::StateChanged.player(), None);
    }
}
