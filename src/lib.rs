//! # Fourline Server
//!
//! Authoritative matchmaking and match server for Fourline, a two-player
//! six-by-seven connect-four game played over WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     FOURLINE SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Game rules (pure, deterministic)          │
//! │  ├── board.rs    - 6x7 grid, gravity drops, win/draw scan    │
//! │  └── bot.rs      - Fallback opponent strategy                │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── protocol.rs - JSON wire messages                        │
//! │  ├── registry.rs - Connection/identity tracking, routing     │
//! │  ├── matchmaking.rs - FIFO queue, greedy pairing             │
//! │  ├── session.rs  - Per-match state machine, rematch votes    │
//! │  └── server.rs   - WebSocket server, fan-out, bot driving    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority
//!
//! The server is the sole source of truth: every move is validated against
//! the session's board and turn before anything mutates, and clients only
//! learn outcomes through broadcast `state`/`result` events. One lock per
//! session serializes its moves and disconnects; sessions are otherwise
//! fully independent.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::board::{Board, Coord, Mark, MoveError, Outcome, COLS, ROWS};
pub use network::protocol::{ClientMessage, RequestError, ServerMessage};
pub use network::server::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
