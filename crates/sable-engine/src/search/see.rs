//! Static exchange evaluation: the material balance of the capture sequence
//! on one square when both sides always recapture with their least valuable
//! piece and may stop whenever continuing would lose material.

use sable_core::attacks::{bishop_attacks, king_attacks, knight_attacks, pawn_attacks, rook_attacks};
use sable_core::{Bitboard, Board, Color, Move, Position, Role, Square, role_index};

/// Exchange values indexed by [`role_index`].
const SEE_VALUE: [i32; 6] = [100, 320, 330, 500, 900, 20_000];

/// Exchange value of a role, also used by futility margins.
#[inline]
pub fn piece_value(role: Role) -> i32 {
    SEE_VALUE[role_index(role)]
}

/// Value of what `mv` captures (a pawn for en passant, 0 for quiet moves).
#[inline]
pub fn captured_value(mv: &Move) -> i32 {
    mv.capture().map_or(0, piece_value)
}

fn attackers_of(sq: Square, occ: Bitboard, board: &Board) -> Bitboard {
    let queens = board.queens();
    let white_pawns = pawn_attacks(Color::Black, sq) & board.pawns() & board.white();
    let black_pawns = pawn_attacks(Color::White, sq) & board.pawns() & board.black();
    (knight_attacks(sq) & board.knights())
        | (king_attacks(sq) & board.kings())
        | (rook_attacks(sq, occ) & (board.rooks() | queens))
        | (bishop_attacks(sq, occ) & (board.bishops() | queens))
        | white_pawns
        | black_pawns
}

fn least_valuable_attacker(attackers: Bitboard, board: &Board) -> Option<(Square, Role)> {
    Role::ALL
        .into_iter()
        .find_map(|role| (attackers & board.by_role(role)).first().map(|sq| (sq, role)))
}

/// Exchange balance of `mv` for the side making it. Castling is 0.
pub fn see(pos: &Position, mv: &Move) -> i32 {
    let Some(from) = mv.from() else {
        return 0;
    };
    if mv.is_castle() {
        return 0;
    }

    let board = pos.board();
    let to = mv.to();
    let mut occ = board.occupied() & !Bitboard::from(from);
    if mv.is_en_passant() {
        occ &= !Bitboard::from(Square::from_coords(to.file(), from.rank()));
    }

    let mut gain = [0i32; 32];
    gain[0] = captured_value(mv);
    // the piece now standing on `to`, which the opponent may win next
    let mut on_square = mv.promotion().map_or_else(|| piece_value(mv.role()), piece_value);
    if let Some(promo) = mv.promotion() {
        gain[0] += piece_value(promo) - piece_value(Role::Pawn);
    }

    let mut side = !pos.side_to_move();
    let mut attackers = attackers_of(to, occ, board) & occ;
    let mut depth = 0usize;

    while let Some((sq, role)) = least_valuable_attacker(attackers & board.by_color(side), board) {
        depth += 1;
        if depth >= gain.len() {
            break;
        }
        gain[depth] = on_square - gain[depth - 1];
        on_square = piece_value(role);

        occ &= !Bitboard::from(sq);
        // removing a piece may uncover a slider behind it
        if matches!(role, Role::Pawn | Role::Bishop | Role::Queen) {
            attackers |= bishop_attacks(to, occ) & (board.bishops() | board.queens());
        }
        if matches!(role, Role::Rook | Role::Queen) {
            attackers |= rook_attacks(to, occ) & (board.rooks() | board.queens());
        }
        attackers &= occ;
        side = !side;
    }

    while depth > 0 {
        depth -= 1;
        gain[depth] = -((-gain[depth]).max(gain[depth + 1]));
    }
    gain[0]
}

/// Whether the exchange balance of `mv` is at least `threshold`.
#[inline]
pub fn see_ge(pos: &Position, mv: &Move, threshold: i32) -> bool {
    see(pos, mv) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn see_of(fen: &str, uci: &str) -> i32 {
        let pos = Position::from_fen(fen).unwrap();
        let mv = pos.parse_uci(uci).unwrap();
        see(&pos, &mv)
    }

    #[test]
    fn pawn_takes_undefended_knight() {
        assert_eq!(see_of("4k3/8/8/3n4/4P3/8/8/4K3 w - - 0 1", "e4d5"), 320);
    }

    #[test]
    fn pawn_takes_defended_knight() {
        // PxN, pxP
        assert_eq!(see_of("4k3/8/4p3/3n4/4P3/8/8/4K3 w - - 0 1", "e4d5"), 220);
    }

    #[test]
    fn queen_takes_defended_pawn_loses() {
        assert_eq!(see_of("7k/8/3p4/2p5/8/4Q3/8/4K3 w - - 0 1", "e3c5"), -800);
    }

    #[test]
    fn xray_rook_supports_exchange() {
        // RxR on d6 is met by ...Rxd6, then the doubled rook recaptures
        let fen = "3rk3/8/3r4/8/8/3R4/3R4/4K3 w - - 0 1";
        assert_eq!(see_of(fen, "d3d6"), 500);
    }

    #[test]
    fn quiet_move_into_attack() {
        // knight steps onto a square covered by a pawn
        assert_eq!(see_of("4k3/8/4p3/8/8/2N5/8/4K3 w - - 0 1", "c3d5"), -320);
    }

    #[test]
    fn en_passant_wins_a_pawn() {
        assert_eq!(see_of("4k3/8/8/3Pp3/8/8/8/4K3 w - e6 0 2", "d5e6"), 100);
    }

    #[test]
    fn castling_is_neutral() {
        assert_eq!(see_of("4k3/8/8/8/8/8/8/4K2R w K - 0 1", "e1g1"), 0);
    }

    #[test]
    fn threshold_form() {
        let pos = Position::from_fen("4k3/8/8/3n4/4P3/8/8/4K3 w - - 0 1").unwrap();
        let mv = pos.parse_uci("e4d5").unwrap();
        assert!(see_ge(&pos, &mv, 0));
        assert!(see_ge(&pos, &mv, 320));
        assert!(!see_ge(&pos, &mv, 321));
    }
}
