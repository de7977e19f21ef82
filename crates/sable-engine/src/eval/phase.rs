//! Game phase from remaining non-pawn material.

use sable_core::Position;

/// Phase of the starting position (knight/bishop 1, rook 2, queen 4).
pub const MAX_PHASE: i32 = 24;

/// Game phase in `0..=MAX_PHASE`; promotions cannot push it past the maximum.
pub fn game_phase(pos: &Position) -> i32 {
    let board = pos.board();
    let minors = (board.knights() | board.bishops()).count() as i32;
    let rooks = board.rooks().count() as i32;
    let queens = board.queens().count() as i32;
    (minors + rooks * 2 + queens * 4).min(MAX_PHASE)
}
