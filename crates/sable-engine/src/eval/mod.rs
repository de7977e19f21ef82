//! Static evaluation: tapered material and piece-square terms.

pub mod material;
pub mod phase;
pub mod pst;
pub mod score;

use sable_core::{Color, Position};

use crate::search::{VALUE_TB_LOSS_IN_MAX_PLY, VALUE_TB_WIN_IN_MAX_PLY, Value};

/// Bonus for having the move.
const TEMPO: Value = 12;

/// Evaluate `pos` from the side to move's perspective.
///
/// The result always stays strictly inside the tablebase range, so a static
/// evaluation can never be mistaken for a proven score.
pub fn evaluate(pos: &Position) -> Value {
    let board = pos.board();
    let score = material::material(board) + pst::pst(board);
    let white = score.taper(phase::game_phase(pos), phase::MAX_PHASE);
    let relative = match pos.side_to_move() {
        Color::White => white,
        Color::Black => -white,
    };
    (relative + TEMPO).clamp(VALUE_TB_LOSS_IN_MAX_PLY + 1, VALUE_TB_WIN_IN_MAX_PLY - 1)
}
