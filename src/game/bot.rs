//! Bot Player
//!
//! Fallback opponent for players nobody pairs with. The strategy is
//! deliberately simple and fully deterministic:
//!
//! 1. If the bot can win in one move, play that move.
//! 2. If the opponent can win in one move, block it.
//! 3. Otherwise prefer the center column, then near-center.

use crate::game::board::{Board, Mark, Outcome, COLS};

/// Reserved display name for the bot participant.
pub const BOT_NAME: &str = "BOT_AI";

/// Center-out column preference used when no tactical move exists.
const COLUMN_ORDER: [usize; COLS] = [3, 2, 4, 1, 5, 0, 6];

/// Choose a column for `bot` to play on `board`.
///
/// Always returns an open column as long as one exists; on a full board the
/// result is arbitrary (the session rejects the move as invalid anyway).
pub fn choose_column(board: &Board, bot: Mark) -> i64 {
    let opponent = bot.other();

    if let Some(col) = winning_column(board, bot) {
        return col;
    }
    if let Some(col) = winning_column(board, opponent) {
        return col;
    }

    for col in COLUMN_ORDER {
        if board.is_column_open(col) {
            return col as i64;
        }
    }

    0
}

/// Find a column that wins immediately for `mark`, if any.
fn winning_column(board: &Board, mark: Mark) -> Option<i64> {
    for col in 0..COLS as i64 {
        if let Ok((next, at)) = board.apply_drop(col, mark) {
            if matches!(next.evaluate(at), Outcome::Win(_)) {
                return Some(col);
            }
        }
    }
    None
}
