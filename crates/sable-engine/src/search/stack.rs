//! Per-ply search stack and the triangular PV table.

use std::ops::{Index, IndexMut};

use sable_core::{Move, PackedMove};

use super::heuristics::ContHistKey;
use super::{MAX_PLY, VALUE_NONE, Value};

/// Sentinel entries below the root; the search reads up to six plies back.
pub const STACK_OFFSET: usize = 7;

/// Entries in a [`Stack`]: sentinels, `MAX_PLY` plies, and two lookahead
/// slots the search clears for its children.
pub const STACK_SIZE: usize = MAX_PLY as usize + 10;

/// What the search knows about one ply of the current line.
#[derive(Debug, Clone, Copy)]
pub struct StackEntry {
    /// Distance from the root.
    pub ply: i32,
    /// Move being searched from this ply, [`PackedMove::NULL`] for a null move.
    pub current_move: PackedMove,
    /// Move skipped by a singular-extension verification search.
    pub excluded_move: PackedMove,
    pub killers: [PackedMove; 2],
    pub static_eval: Value,
    /// History score of `current_move`, used by the child's pruning.
    pub stat_score: i32,
    pub move_count: i32,
    pub in_check: bool,
    /// This node is or was on a principal variation.
    pub tt_pv: bool,
    pub tt_hit: bool,
    pub double_extensions: i32,
    /// Beta cutoffs among this node's children.
    pub cutoff_cnt: i32,
    /// Continuation table selected by `current_move`; `None` for a null
    /// move and below the root.
    pub cont_hist: Option<ContHistKey>,
}

impl Default for StackEntry {
    fn default() -> Self {
        Self {
            ply: 0,
            current_move: PackedMove::NONE,
            excluded_move: PackedMove::NONE,
            killers: [PackedMove::NONE; 2],
            static_eval: VALUE_NONE,
            stat_score: 0,
            move_count: 0,
            in_check: false,
            tt_pv: false,
            tt_hit: false,
            double_extensions: 0,
            cutoff_cnt: 0,
            cont_hist: None,
        }
    }
}

/// The search stack, indexed by `ply + STACK_OFFSET`.
pub struct Stack {
    entries: Box<[StackEntry]>,
}

impl Stack {
    pub fn new() -> Self {
        let mut stack = Self {
            entries: vec![StackEntry::default(); STACK_SIZE].into_boxed_slice(),
        };
        stack.reset();
        stack
    }

    /// Prepare for a new iterative-deepening run.
    pub fn reset(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            *entry = StackEntry {
                ply: i as i32 - STACK_OFFSET as i32,
                ..StackEntry::default()
            };
        }
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for Stack {
    type Output = StackEntry;

    #[inline]
    fn index(&self, ss: usize) -> &StackEntry {
        &self.entries[ss]
    }
}

impl IndexMut<usize> for Stack {
    #[inline]
    fn index_mut(&mut self, ss: usize) -> &mut StackEntry {
        &mut self.entries[ss]
    }
}

/// Triangular PV table. Row `ply` holds the best line found from that ply;
/// a PV node rebuilds its row from the best move and its child's row.
pub struct PvTable {
    lines: Vec<Vec<Move>>,
}

impl PvTable {
    pub fn new() -> Self {
        let rows = MAX_PLY as usize + 2;
        Self {
            lines: (0..rows).map(|_| Vec::with_capacity(rows)).collect(),
        }
    }

    #[inline]
    pub fn clear(&mut self, ply: i32) {
        if let Some(line) = self.lines.get_mut(ply as usize) {
            line.clear();
        }
    }

    /// Row `ply` becomes `mv` followed by row `ply + 1`.
    pub fn update(&mut self, ply: i32, mv: &Move) {
        let ply = ply as usize;
        if ply + 1 >= self.lines.len() {
            return;
        }
        let (top, bottom) = self.lines.split_at_mut(ply + 1);
        let line = &mut top[ply];
        line.clear();
        line.push(mv.clone());
        line.extend_from_slice(&bottom[0]);
    }

    /// The line stored at `ply`.
    pub fn line(&self, ply: i32) -> &[Move] {
        self.lines.get(ply as usize).map_or(&[], Vec::as_slice)
    }
}

impl Default for PvTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use sable_core::Position;

    use super::*;

    #[test]
    fn reset_numbers_plies_from_the_root() {
        let mut stack = Stack::new();
        stack[STACK_OFFSET + 3].move_count = 9;
        stack.reset();
        assert_eq!(stack[STACK_OFFSET].ply, 0);
        assert_eq!(stack[STACK_OFFSET + 5].ply, 5);
        assert_eq!(stack[STACK_OFFSET + 3].move_count, 0);
        assert_eq!(stack[0].static_eval, VALUE_NONE);
        assert!(stack[STACK_OFFSET - 1].cont_hist.is_none());
    }

    #[test]
    fn deepest_lookahead_fits() {
        let stack = Stack::new();
        let deepest = STACK_OFFSET + MAX_PLY as usize + 2;
        assert_eq!(stack[deepest].ply, MAX_PLY + 2);
    }

    #[test]
    fn pv_rows_chain() {
        let mut pos = Position::startpos();
        let e4 = pos.parse_uci("e2e4").unwrap();
        pos.do_move(&e4);
        let e5 = pos.parse_uci("e7e5").unwrap();

        let mut pv = PvTable::new();
        pv.clear(1);
        pv.update(1, &e5);
        pv.update(0, &e4);
        assert_eq!(pv.line(0), &[e4.clone(), e5.clone()]);

        // a later clear of the child row does not touch the parent row
        pv.clear(1);
        assert_eq!(pv.line(0).len(), 2);
        pv.update(0, &e4);
        assert_eq!(pv.line(0), &[e4]);
    }
}
