//! Piece-square tables.
//!
//! Tables are built at compile time from a few shape terms (centralisation,
//! advancement, king shelter) rather than typed out square by square. They
//! are indexed from White's point of view, a1 = 0 .. h8 = 63; Black looks up
//! the vertically mirrored square.

use sable_core::{Board, Color, Role, role_index};

use crate::eval::score::{S, Score};

/// Distance from the board centre, 0 (d4/e4/d5/e5) to 3 (corners).
const fn centre_distance(sq: usize) -> i16 {
    let file = (sq % 8) as i16;
    let rank = (sq / 8) as i16;
    let df = if file < 4 { 3 - file } else { file - 4 };
    let dr = if rank < 4 { 3 - rank } else { rank - 4 };
    if df > dr { df } else { dr }
}

const fn build(role: usize) -> [Score; 64] {
    let mut table = [Score::ZERO; 64];
    let mut sq = 0;
    while sq < 64 {
        let file = (sq % 8) as i16;
        let rank = (sq / 8) as i16;
        let centre = 3 - centre_distance(sq);
        let edge_file = file == 0 || file == 7;
        table[sq] = match role {
            // pawns: push central pawns early, any pawn late
            0 => {
                if rank == 0 || rank == 7 {
                    S(0, 0)
                } else {
                    let central = if file == 3 || file == 4 { 6 } else { 0 };
                    let early = if rank > 4 { 3 } else { rank - 1 };
                    S((rank - 1) * 4 + central * early, (rank - 1) * (rank - 1) * 5)
                }
            }
            1 => S(centre * 14 - 20, centre * 10 - 15),
            2 => {
                let diag = if file == rank || file + rank == 7 { 8 } else { 0 };
                S(centre * 6 + diag - 8, centre * 5 - 6)
            }
            // rooks: seventh rank and central files
            3 => {
                let seventh = if rank == 6 { 18 } else { 0 };
                let open = if file == 3 || file == 4 { 6 } else if edge_file { -4 } else { 0 };
                S(seventh + open, seventh / 2)
            }
            4 => S(centre * 3 - 4, centre * 8 - 10),
            // king: sheltered corners in the middlegame, centre in the endgame
            _ => {
                let shelter = if rank == 0 {
                    if file <= 2 || file >= 6 { 20 } else { 0 }
                } else {
                    -12 * rank
                };
                S(shelter, centre * 14 - 22)
            }
        };
        sq += 1;
    }
    table
}

/// All six tables indexed by [`role_index`].
pub const PST: [[Score; 64]; 6] = [build(0), build(1), build(2), build(3), build(4), build(5)];

/// Table value for a piece of `color` and `role` on square index `sq`.
#[inline]
pub fn pst_value(color: Color, role: Role, sq: usize) -> Score {
    let idx = match color {
        Color::White => sq,
        Color::Black => sq ^ 56,
    };
    PST[role_index(role)][idx]
}

/// Sum of table values; positive favours White.
pub fn pst(board: &Board) -> Score {
    let mut score = Score::ZERO;
    for sq in board.occupied() {
        if let Some(piece) = board.piece_at(sq) {
            let value = pst_value(piece.color, piece.role, sq as usize);
            match piece.color {
                Color::White => score += value,
                Color::Black => score -= value,
            }
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use sable_core::Position;

    use super::*;

    #[test]
    fn symmetric_at_start() {
        assert_eq!(pst(Position::startpos().board()), Score::ZERO);
    }

    #[test]
    fn knights_prefer_the_centre() {
        let corner = pst_value(Color::White, Role::Knight, 0);
        let centre = pst_value(Color::White, Role::Knight, 27);
        assert!(centre.mg() > corner.mg());
        assert!(centre.eg() > corner.eg());
    }

    #[test]
    fn black_lookup_is_mirrored() {
        // e2 for White and e7 for Black are the same relative square
        assert_eq!(pst_value(Color::White, Role::Pawn, 12), pst_value(Color::Black, Role::Pawn, 52));
    }

    #[test]
    fn advanced_pawns_score_higher_in_endgame() {
        let second = pst_value(Color::White, Role::Pawn, 8);
        let seventh = pst_value(Color::White, Role::Pawn, 48);
        assert!(seventh.eg() > second.eg());
    }
}
