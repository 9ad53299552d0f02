//! Network Layer
//!
//! WebSocket server for real-time play. This layer is **non-deterministic** -
//! all game rules run through `game/`.

pub mod matchmaking;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use matchmaking::{JoinOutcome, MatchQueue, QueueEntry};
pub use protocol::{ClientMessage, MatchResult, RequestError, ServerMessage};
pub use registry::{ConnectionRegistry, GameId};
pub use server::{GameServer, GameServerError, ServerConfig};
pub use session::{GameSession, GameStatus, Participant, SessionManager};
