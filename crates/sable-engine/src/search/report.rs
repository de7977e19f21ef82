//! Progress and result reporting.
//!
//! The search never writes to stdout. The main thread hands everything it
//! would report to a [`SearchListener`]; a protocol front end turns the
//! callbacks into `info`/`bestmove` lines, tests collect them.

use std::time::Duration;

use sable_core::{Move, Position};

use super::{Depth, VALUE_MATE, VALUE_MATE_IN_MAX_PLY, Value};

/// One principal variation line after an iteration (or aspiration retry).
#[derive(Debug, Clone, Copy)]
pub struct IterationInfo<'a> {
    pub depth: Depth,
    pub sel_depth: i32,
    /// 1-based line number.
    pub multipv: usize,
    pub score: Value,
    /// The score only proves `score` or better (fail high).
    pub lowerbound: bool,
    /// The score only proves `score` or worse (fail low).
    pub upperbound: bool,
    pub nodes: u64,
    pub nps: u64,
    pub tb_hits: u64,
    /// Permille of the TT in use.
    pub hashfull: usize,
    pub elapsed: Duration,
    pub pv: &'a [Move],
}

impl IterationInfo<'_> {
    /// The PV in UCI notation, space separated.
    pub fn pv_string(&self) -> String {
        pv_to_string(self.pv)
    }
}

/// The move a finished search settled on.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// `None` when the root position has no legal move.
    pub best_move: Option<Move>,
    /// Expected reply, for pondering.
    pub ponder_move: Option<Move>,
    pub pv: Vec<Move>,
    pub score: Value,
    /// Deepest completed iteration of the thread the move came from.
    pub depth: Depth,
    pub sel_depth: i32,
    /// Nodes searched by all threads.
    pub nodes: u64,
}

/// Receives search progress. Called from the main search thread only.
pub trait SearchListener: Send + Sync {
    /// A principal variation line is ready.
    fn on_iteration(&self, _info: &IterationInfo<'_>) {}

    /// The search finished and this is the move to play.
    fn on_best_move(&self, _result: &SearchResult) {}

    /// A perft request finished.
    fn on_perft(&self, _nodes: u64) {}
}

/// Listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl SearchListener for NoopListener {}

/// Score in the conventional display form: `cp <n>` or `mate <moves>`.
pub fn format_score(v: Value) -> String {
    if v.abs() >= VALUE_MATE_IN_MAX_PLY {
        let moves = if v > 0 { (VALUE_MATE - v + 1) / 2 } else { -(VALUE_MATE + v) / 2 };
        format!("mate {moves}")
    } else {
        format!("cp {v}")
    }
}

/// Moves in UCI notation, space separated.
pub fn pv_to_string(pv: &[Move]) -> String {
    pv.iter().map(Position::to_uci).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{mate_in, mated_in};

    #[test]
    fn centipawns_and_mates() {
        assert_eq!(format_score(35), "cp 35");
        assert_eq!(format_score(-120), "cp -120");
        assert_eq!(format_score(mate_in(1)), "mate 1");
        assert_eq!(format_score(mate_in(3)), "mate 2");
        assert_eq!(format_score(mated_in(2)), "mate -1");
        assert_eq!(format_score(mated_in(0)), "mate 0");
    }

    #[test]
    fn pv_string_is_uci() {
        let pos = Position::startpos();
        let mv = pos.parse_uci("e2e4").unwrap();
        assert_eq!(pv_to_string(&[mv]), "e2e4");
        assert_eq!(pv_to_string(&[]), "");
    }
}
