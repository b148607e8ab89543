//! Core primitives.
//!
//! Vector math and the seeded RNG shared by every gameplay module.

pub mod vec3;
pub mod rng;

// Re-export core types
pub use vec3::Vec3;
pub use rng::DeterministicRng;
