//! 16-bit move encoding for transposition table storage.
//!
//! ```text
//! bits 15-12: promotion role (0 = none, 2..=5 = knight..queen)
//! bits 11-6:  destination square (rook square for castling)
//! bits 5-0:   source square
//! ```
//!
//! A packed move is only a hint: it is resolved by comparing against the
//! legal moves of the probing position, so stale or colliding entries
//! never produce an illegal move.

use shakmaty::Move;

/// Compact, `Copy` move fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PackedMove(u16);

impl PackedMove {
    /// No move.
    pub const NONE: PackedMove = PackedMove(0);

    /// Marker for a null move on the search stack (b1b1, never legal).
    pub const NULL: PackedMove = PackedMove(0x41);

    /// Pack a move.
    pub fn new(mv: &Move) -> PackedMove {
        let from = mv.from().map_or(0, |sq| sq as u16);
        let to = mv.to() as u16;
        let promo = mv.promotion().map_or(0, |role| role as u16);
        PackedMove(from | (to << 6) | (promo << 12))
    }

    /// Pack an optional move, mapping `None` to [`PackedMove::NONE`].
    pub fn from_option(mv: Option<&Move>) -> PackedMove {
        mv.map_or(PackedMove::NONE, PackedMove::new)
    }

    /// Rebuild from raw bits (as stored in the TT).
    pub const fn from_raw(raw: u16) -> PackedMove {
        PackedMove(raw)
    }

    /// Raw bits.
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// True for [`PackedMove::NONE`].
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// True for a real move, neither [`PackedMove::NONE`] nor [`PackedMove::NULL`].
    pub const fn is_ok(self) -> bool {
        self.0 != PackedMove::NONE.0 && self.0 != PackedMove::NULL.0
    }

    /// Source and destination squares as a 12-bit index, for butterfly tables.
    pub const fn from_to(self) -> usize {
        (self.0 & 0x0fff) as usize
    }

    /// Destination square index.
    pub const fn to_index(self) -> usize {
        ((self.0 >> 6) & 0x3f) as usize
    }

    /// Whether `mv` packs to this value.
    pub fn matches(self, mv: &Move) -> bool {
        !self.is_none() && PackedMove::new(mv) == self
    }

    /// Find the legal move this value stands for.
    pub fn resolve<'a>(self, moves: &'a [Move]) -> Option<&'a Move> {
        if !self.is_ok() {
            return None;
        }
        moves.iter().find(|m| self.matches(m))
    }
}

#[cfg(test)]
mod tests {
    use super::PackedMove;
    use crate::Position;

    #[test]
    fn every_startpos_move_packs_uniquely() {
        let pos = Position::startpos();
        let moves = pos.legal_moves();
        let mut packed: Vec<u16> = moves.iter().map(|m| PackedMove::new(m).raw()).collect();
        packed.sort_unstable();
        packed.dedup();
        assert_eq!(packed.len(), moves.len());
    }

    #[test]
    fn promotions_are_distinguished() {
        let pos = Position::from_fen("8/P6k/8/8/8/8/8/K7 w - - 0 1").unwrap();
        let promos: Vec<_> = pos
            .legal_moves()
            .iter()
            .filter(|m| m.is_promotion())
            .map(PackedMove::new)
            .collect();
        assert_eq!(promos.len(), 4);
        for (i, a) in promos.iter().enumerate() {
            for b in &promos[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn none_matches_nothing() {
        let pos = Position::startpos();
        assert!(pos.legal_moves().iter().all(|m| !PackedMove::NONE.matches(m)));
    }
}
