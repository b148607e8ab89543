//! Network Layer
//!
//! WebSocket server for real-time multiplayer communication.
//! This layer owns no game rules; all gameplay runs through `game/`.

pub mod debug;
pub mod protocol;
pub mod server;
pub mod session;
pub mod snapshot;

pub use protocol::{ClientMessage, InputMessage, ServerMessage, StateSnapshot};
pub use server::{GameServer, GameServerError, ServerConfig};
pub use session::{ArenaSession, ConnectionId, Outbound, SharedSession};
pub use snapshot::{SnapshotError, SnapshotStore};
