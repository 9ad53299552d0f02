//! Game Logic Module
//!
//! Pure rules for the 6x7 grid. 100% deterministic: no I/O, no clocks, no
//! concurrency. Everything stateful lives in `network/`.
//!
//! ## Module Structure
//!
//! - `board`: grid representation, gravity drops, win/draw detection
//! - `bot`: fallback opponent strategy

pub mod board;
pub mod bot;

// Re-export key types
pub use board::{Board, Coord, Mark, MoveError, Outcome, COLS, ROWS};
pub use bot::{choose_column, BOT_NAME};
