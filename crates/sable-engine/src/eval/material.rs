//! Material balance with a bishop-pair bonus, from White's perspective.

use sable_core::{Board, Color, Role, role_index};

use crate::eval::score::{S, Score};

/// Base material values indexed by [`role_index`]: pawn, knight, bishop,
/// rook, queen, king.
pub const MATERIAL_VALUE: [Score; 6] = [
    S(82, 104),
    S(337, 281),
    S(365, 297),
    S(477, 512),
    S(1025, 936),
    S(0, 0),
];

const BISHOP_PAIR_BONUS: Score = S(30, 55);

/// Material balance; positive when White is ahead.
pub fn material(board: &Board) -> Score {
    let mut score = Score::ZERO;
    for role in Role::ALL {
        let pieces = board.by_role(role);
        let white = (pieces & board.by_color(Color::White)).count() as i16;
        let black = (pieces & board.by_color(Color::Black)).count() as i16;
        score += MATERIAL_VALUE[role_index(role)] * (white - black);
    }

    let bishops = board.bishops();
    if (bishops & board.white()).count() >= 2 {
        score += BISHOP_PAIR_BONUS;
    }
    if (bishops & board.black()).count() >= 2 {
        score -= BISHOP_PAIR_BONUS;
    }
    score
}
