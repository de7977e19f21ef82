//! Candidate moves at the root and their search results.

use std::cmp::Ordering;

use sable_core::{Move, Position};

use super::tt::TranspositionTable;
use super::{VALUE_INFINITE, Value};

/// One legal root move with everything the search learned about it.
///
/// `pv` is never empty: its first move is the root move itself.
#[derive(Debug, Clone)]
pub struct RootMove {
    pub pv: Vec<Move>,
    /// Score of the latest search, `-VALUE_INFINITE` if not searched yet.
    pub score: Value,
    /// Score from the previous iteration.
    pub previous_score: Value,
    /// Smoothed score across iterations, seeds the aspiration window.
    pub average_score: Value,
    /// Score to report; equals `score` unless the search failed high or low.
    pub uci_score: Value,
    pub score_lowerbound: bool,
    pub score_upperbound: bool,
    pub sel_depth: i32,
    /// Tablebase rank; root moves of equal rank are searched together.
    pub tb_rank: i32,
    pub tb_score: Value,
}

impl RootMove {
    pub fn new(mv: Move) -> Self {
        Self {
            pv: vec![mv],
            score: -VALUE_INFINITE,
            previous_score: -VALUE_INFINITE,
            average_score: -VALUE_INFINITE,
            uci_score: -VALUE_INFINITE,
            score_lowerbound: false,
            score_upperbound: false,
            sel_depth: 0,
            tb_rank: 0,
            tb_score: 0,
        }
    }

    /// The root move.
    pub fn mv(&self) -> &Move {
        &self.pv[0]
    }

    /// Whether this entry is for `mv`.
    pub fn is(&self, mv: &Move) -> bool {
        self.pv[0] == *mv
    }

    /// When the PV stops after the root move, look the reply up in the TT so
    /// there is a move to ponder on. Returns whether the PV now has one.
    pub fn extract_ponder_from_tt(&mut self, tt: &TranspositionTable, pos: &Position) -> bool {
        if self.pv.len() > 1 {
            return true;
        }
        match ponder_from_tt(tt, pos, &self.pv[0]) {
            Some(reply) => {
                self.pv.push(reply);
                true
            }
            None => false,
        }
    }
}

/// The TT move of the position after `mv`, if it is legal there.
fn ponder_from_tt(tt: &TranspositionTable, pos: &Position, mv: &Move) -> Option<Move> {
    let mut child = pos.clone();
    child.do_move(mv);
    let entry = tt.probe(child.key(), 1)?;
    entry.best_move.resolve(&child.legal_moves()).cloned()
}

/// Descending by `score`, ties by `previous_score`. Sorting a slice with this
/// order is stable, so equal moves keep their relative order.
impl Ord for RootMove {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .cmp(&self.score)
            .then_with(|| other.previous_score.cmp(&self.previous_score))
    }
}

impl PartialOrd for RootMove {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Equal means equally good, not the same move.
impl PartialEq for RootMove {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RootMove {}

/// All root moves of a search, best first after each iteration.
pub type RootMoves = Vec<RootMove>;

#[cfg(test)]
mod tests {
    use sable_core::PackedMove;

    use super::*;
    use crate::search::tt::Bound;

    fn root_moves(pos: &Position) -> RootMoves {
        pos.legal_moves().iter().cloned().map(RootMove::new).collect()
    }

    #[test]
    fn new_root_move_is_unsearched() {
        let pos = Position::startpos();
        let rm = RootMove::new(pos.parse_uci("e2e4").unwrap());
        assert_eq!(rm.score, -VALUE_INFINITE);
        assert_eq!(rm.pv.len(), 1);
    }

    #[test]
    fn sort_is_descending_and_stable() {
        let pos = Position::startpos();
        let mut moves = root_moves(&pos);
        let first = moves[0].mv().clone();
        let second = moves[1].mv().clone();
        let last = moves[19].mv().clone();
        moves[0].score = 10;
        moves[1].score = 10;
        moves[19].score = 50;
        moves.sort();
        assert!(moves[0].is(&last));
        // equal scores keep their order
        assert!(moves[1].is(&first));
        assert!(moves[2].is(&second));
        assert!(moves.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn previous_score_breaks_ties() {
        let pos = Position::startpos();
        let mut moves = root_moves(&pos);
        let later = moves[5].mv().clone();
        moves[3].score = 0;
        moves[5].score = 0;
        moves[5].previous_score = 20;
        moves.sort();
        assert!(moves[0].is(&later));
    }

    #[test]
    fn order_is_a_strict_total_order() {
        let pos = Position::startpos();
        let mut moves = root_moves(&pos);
        // a spread of scores with repeats, ties broken by previous scores
        for (i, rm) in moves.iter_mut().enumerate() {
            rm.score = [30, -5, 30, -VALUE_INFINITE, 12][i % 5];
            rm.previous_score = (i as Value * 7) % 4;
        }

        for a in &moves {
            assert_eq!(a.cmp(a), Ordering::Equal);
            for b in &moves {
                assert_eq!(a.cmp(b), b.cmp(a).reverse(), "antisymmetric");
                for c in &moves {
                    if a <= b && b <= c {
                        assert!(a <= c, "transitive");
                    }
                }
            }
        }
    }

    #[test]
    fn sorting_twice_changes_nothing() {
        let pos = Position::startpos();
        let mut moves = root_moves(&pos);
        for (i, rm) in moves.iter_mut().enumerate() {
            rm.score = (i as Value * 37) % 11 - 5;
            rm.previous_score = (i as Value * 13) % 3;
        }
        moves.sort();
        let once: Vec<Move> = moves.iter().map(|rm| rm.mv().clone()).collect();
        moves.sort();
        let twice: Vec<Move> = moves.iter().map(|rm| rm.mv().clone()).collect();
        assert_eq!(once, twice);
    }

    #[test]
    fn ponder_move_comes_from_tt() {
        let pos = Position::startpos();
        let e4 = pos.parse_uci("e2e4").unwrap();
        let mut child = pos.clone();
        child.do_move(&e4);
        let e5 = child.parse_uci("e7e5").unwrap();

        let tt = TranspositionTable::new(1);
        let mut rm = RootMove::new(e4);
        assert!(!rm.extract_ponder_from_tt(&tt, &pos));

        tt.store(child.key(), 5, Bound::Exact, 0, 0, PackedMove::new(&e5), 1, true);
        assert!(rm.extract_ponder_from_tt(&tt, &pos));
        assert_eq!(rm.pv[1], e5);
    }

    #[test]
    fn illegal_tt_reply_is_ignored() {
        let pos = Position::startpos();
        let e4 = pos.parse_uci("e2e4").unwrap();
        let mut child = pos.clone();
        child.do_move(&e4);

        let tt = TranspositionTable::new(1);
        // a white move stored for a black-to-move position
        tt.store(child.key(), 5, Bound::Exact, 0, 0, PackedMove::new(&e4), 1, true);
        assert!(ponder_from_tt(&tt, &pos, &e4).is_none());
    }
}
