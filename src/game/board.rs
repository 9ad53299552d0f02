//! Board Engine
//!
//! Pure rule logic for the 6x7 grid: gravity drops, win detection, draw
//! detection. Every operation takes a board and returns a new board; the same
//! inputs always produce the same outputs, so a match can be replayed
//! deterministically from its move list.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of rows on the board. Row 0 is the top, row 5 the bottom.
pub const ROWS: usize = 6;

/// Number of columns on the board.
pub const COLS: usize = 7;

/// How many contiguous marks win the game.
pub const WIN_LENGTH: usize = 4;

// =============================================================================
// MARK
// =============================================================================

/// The per-player token placed on the board.
///
/// `P1` always moves first. The wire representation is 1 / 2, matching the
/// grid cell values clients render.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Mark {
    /// Player one's token.
    P1,
    /// Player two's token.
    P2,
}

impl Mark {
    /// The other player's mark.
    pub fn other(self) -> Mark {
        match self {
            Mark::P1 => Mark::P2,
            Mark::P2 => Mark::P1,
        }
    }

    /// Slot index (0 for player one, 1 for player two).
    pub fn index(self) -> usize {
        match self {
            Mark::P1 => 0,
            Mark::P2 => 1,
        }
    }

    /// Cell value on the wire grid (1 for player one, 2 for player two).
    pub fn value(self) -> u8 {
        match self {
            Mark::P1 => 1,
            Mark::P2 => 2,
        }
    }
}

// =============================================================================
// BOARD
// =============================================================================

/// A cell coordinate. `row` 0 is the top row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Coord {
    /// Row index, counted from the top.
    pub row: usize,
    /// Column index, counted from the left.
    pub column: usize,
}

/// Move rejection reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    /// The requested column does not exist on the board.
    #[error("column {column} is outside the board")]
    OutOfRange {
        /// Column index as requested by the client.
        column: i64,
    },

    /// The requested column has no empty cell left.
    #[error("column {column} is full")]
    ColumnFull {
        /// Column index as requested by the client.
        column: usize,
    },
}

/// Result of evaluating a board position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No terminal condition; play continues.
    Ongoing,
    /// Four in a row for the given mark.
    Win(Mark),
    /// Board full with no winner.
    Draw,
}

/// The 6x7 playing grid.
///
/// Invariant: a mark can only occupy a cell if every cell below it in the
/// same column is also marked. [`Board::apply_drop`] is the only way to place
/// a mark, and it always targets the lowest empty row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Board {
    cells: [[Option<Mark>; COLS]; ROWS],
}

impl Board {
    /// An empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// The mark at `(row, column)`, or `None` for an empty cell.
    pub fn cell(&self, row: usize, column: usize) -> Option<Mark> {
        self.cells[row][column]
    }

    /// Whether the column has at least one empty cell.
    ///
    /// Only meaningful for in-range columns; out-of-range columns are never
    /// open.
    pub fn is_column_open(&self, column: usize) -> bool {
        column < COLS && self.cells[0][column].is_none()
    }

    /// Whether the entire top row is occupied.
    pub fn is_full(&self) -> bool {
        self.cells[0].iter().all(|cell| cell.is_some())
    }

    /// Drop `mark` into `column`, returning the successor board and the cell
    /// the mark landed in.
    ///
    /// Fails when the column is outside `[0, 7)` or already full. The
    /// receiver is never mutated.
    pub fn apply_drop(&self, column: i64, mark: Mark) -> Result<(Board, Coord), MoveError> {
        let col = match usize::try_from(column) {
            Ok(c) if c < COLS => c,
            _ => return Err(MoveError::OutOfRange { column }),
        };

        let mut next = *self;
        for row in (0..ROWS).rev() {
            if next.cells[row][col].is_none() {
                next.cells[row][col] = Some(mark);
                return Ok((next, Coord { row, column: col }));
            }
        }

        Err(MoveError::ColumnFull { column: col })
    }

    /// Evaluate the position after a drop.
    ///
    /// `last` must be the cell placed by the most recent drop; a win can only
    /// be completed by the latest move, so scanning the four directions
    /// through that cell is sufficient. Reports [`Outcome::Draw`] when the
    /// top row is full and no run was found.
    pub fn evaluate(&self, last: Coord) -> Outcome {
        let Some(mark) = self.cells[last.row][last.column] else {
            return Outcome::Ongoing;
        };

        // Directions: horizontal, vertical, both diagonals.
        const DIRECTIONS: [(i64, i64); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

        for (dr, dc) in DIRECTIONS {
            let run = 1
                + self.count_run(last, dr, dc, mark)
                + self.count_run(last, -dr, -dc, mark);
            if run >= WIN_LENGTH {
                return Outcome::Win(mark);
            }
        }

        if self.is_full() {
            Outcome::Draw
        } else {
            Outcome::Ongoing
        }
    }

    /// Wire representation: 0 = empty, 1 = player one, 2 = player two.
    pub fn grid(&self) -> [[u8; COLS]; ROWS] {
        let mut grid = [[0u8; COLS]; ROWS];
        for (row, cells) in self.cells.iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                grid[row][col] = cell.map(Mark::value).unwrap_or(0);
            }
        }
        grid
    }

    /// Count contiguous `mark` cells from `start` (exclusive) along a
    /// direction.
    fn count_run(&self, start: Coord, dr: i64, dc: i64, mark: Mark) -> usize {
        let mut count = 0;
        let mut row = start.row as i64 + dr;
        let mut col = start.column as i64 + dc;

        while (0..ROWS as i64).contains(&row)
            && (0..COLS as i64).contains(&col)
            && self.cells[row as usize][col as usize] == Some(mark)
        {
            count += 1;
            row += dr;
            col += dc;
        }

        count
    }
}
