//! # Hunter Boyz Server
//!
//! Authoritative game server for Hunter Boyz, a browser arena shooter.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    HUNTER BOYZ SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Math primitives                           │
//! │  ├── vec3.rs     - 3D vector                                 │
//! │  └── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │                                                              │
//! │  game/           - Simulation (no I/O)                       │
//! │  ├── state.rs    - World, players, pads, drops               │
//! │  ├── combat.rs   - Fire resolution and damage                │
//! │  ├── grenade.rs  - Projectiles                               │
//! │  ├── pickup.rs   - Power weapon economy                      │
//! │  ├── round.rs    - Round state machine                       │
//! │  └── tick.rs     - Timed updates                             │
//! │                                                              │
//! │  network/        - Transport                                 │
//! │  ├── server.rs   - WebSocket server and loops                │
//! │  ├── protocol.rs - Wire messages and snapshots               │
//! │  ├── session.rs  - Connections bound to the world            │
//! │  ├── debug.rs    - Loopback debug HTTP                       │
//! │  └── snapshot.rs - Screenshot uploads                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All mutation of the world runs under one lock, one operation at a time.
//! Given the same seed, inputs and timestamps the simulation produces the
//! same results.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use core::vec3::Vec3;
pub use game::state::{PlayerId, World};
pub use game::tick::MatchConfig;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 15;
