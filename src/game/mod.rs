//! Game Logic Module
//!
//! The whole simulation. Nothing in here knows about sockets; every function
//! takes the [`World`] it works on and an explicit millisecond timestamp.
//!
//! ## Module Structure
//!
//! - `state`: World, players, pads, drops, grenades
//! - `map`: Map geometry and the built-in registry
//! - `weapon`: Closed weapon table
//! - `input`: Input frames and sanitizing
//! - `movement`: Kinematics and obstacle sliding
//! - `combat`: Fire resolution and the damage pipeline
//! - `grenade`: Projectile integration and detonation
//! - `pickup`: Pads, drops and reconciliation
//! - `round`: Round state machine and spawning
//! - `tick`: Timed updates and the tunables
//! - `events`: Outbox consumed by the network layer

pub mod combat;
pub mod events;
pub mod grenade;
pub mod input;
pub mod map;
pub mod movement;
pub mod pickup;
pub mod round;
pub mod state;
pub mod tick;
pub mod weapon;

// Re-export key types
pub use events::GameEvent;
pub use input::PlayerInput;
pub use map::{Map, MapRegistry};
pub use state::{ActionError, PlayerId, World};
pub use tick::{MatchConfig, TickResult};
pub use weapon::WeaponKind;
