//! Lazy-SMP search: per-thread workers, the pool that drives them, and the
//! shared state they coordinate through.

pub mod control;
pub mod heuristics;
pub mod limits;
mod negamax;
pub mod ordering;
pub mod pool;
pub mod report;
pub mod root_move;
pub mod see;
pub mod stack;
pub mod thread;
pub mod tt;
pub mod worker;

use std::sync::Arc;

use control::{SearchControl, ThreadCounters};
use report::SearchListener;
use tt::TranspositionTable;

use crate::options::EngineOptions;

/// Search score in centipawns, from the side to move's perspective.
pub type Value = i32;

/// Search depth in plies.
pub type Depth = i32;

/// Deepest ply the search will reach from the root.
pub const MAX_PLY: i32 = 128;

pub const VALUE_ZERO: Value = 0;
pub const VALUE_DRAW: Value = 0;
pub const VALUE_MATE: Value = 32_000;
pub const VALUE_INFINITE: Value = 32_001;
/// "No score", also stored in TT entries that only carry an evaluation.
pub const VALUE_NONE: Value = 32_002;

pub const VALUE_MATE_IN_MAX_PLY: Value = VALUE_MATE - MAX_PLY;
pub const VALUE_MATED_IN_MAX_PLY: Value = -VALUE_MATE_IN_MAX_PLY;

/// Tablebase wins sit just below the mate range. Nothing produces them
/// without a tablebase, but the band keeps score classification uniform.
pub const VALUE_TB: Value = VALUE_MATE_IN_MAX_PLY - 1;
pub const VALUE_TB_WIN_IN_MAX_PLY: Value = VALUE_TB - MAX_PLY;
pub const VALUE_TB_LOSS_IN_MAX_PLY: Value = -VALUE_TB_WIN_IN_MAX_PLY;

/// Depth stored for quiescence entries that searched quiet checks.
pub const DEPTH_QS_CHECKS: Depth = 0;
/// Depth stored for quiescence entries that searched captures only.
pub const DEPTH_QS_NO_CHECKS: Depth = -1;
/// Depth stored for entries that only carry a static evaluation.
pub const DEPTH_NONE: Depth = -6;
/// Lowest depth the TT can represent; stored depths are biased by this.
pub const DEPTH_OFFSET: Depth = -7;

/// Score for delivering mate `ply` plies from the root.
#[inline]
pub const fn mate_in(ply: i32) -> Value {
    VALUE_MATE - ply
}

/// Score for being mated `ply` plies from the root.
#[inline]
pub const fn mated_in(ply: i32) -> Value {
    -VALUE_MATE + ply
}

/// Whether `v` is a proven win (mate or tablebase).
#[inline]
pub const fn is_win(v: Value) -> bool {
    v >= VALUE_TB_WIN_IN_MAX_PLY
}

/// Whether `v` is a proven loss.
#[inline]
pub const fn is_loss(v: Value) -> bool {
    v <= VALUE_TB_LOSS_IN_MAX_PLY
}

/// Compile-time node classification: the root, other principal-variation
/// nodes, and zero-window nodes. Search code is monomorphised per kind.
pub(crate) trait NodeType {
    const PV: bool;
    const ROOT: bool;
}

pub(crate) struct Root;
pub(crate) struct Pv;
pub(crate) struct NonPv;

impl NodeType for Root {
    const PV: bool = true;
    const ROOT: bool = true;
}

impl NodeType for Pv {
    const PV: bool = true;
    const ROOT: bool = false;
}

impl NodeType for NonPv {
    const PV: bool = false;
    const ROOT: bool = false;
}

/// Everything a worker shares with the rest of the pool for one search
/// session: the options snapshot, the transposition table, the session
/// control block, every thread's counters, and the progress listener.
///
/// Cloning is cheap; the pool hands a clone to each worker when a search
/// starts, so a worker never holds a reference to the pool itself.
#[derive(Clone)]
pub struct ExternalShared {
    pub options: Arc<EngineOptions>,
    pub tt: Arc<TranspositionTable>,
    pub control: Arc<SearchControl>,
    pub counters: Arc<[ThreadCounters]>,
    pub listener: Arc<dyn SearchListener>,
}

impl ExternalShared {
    /// Nodes searched by all threads in the current session.
    pub fn nodes_searched(&self) -> u64 {
        self.counters.iter().map(ThreadCounters::nodes).sum()
    }

    /// Tablebase hits across all threads.
    pub fn tb_hits(&self) -> u64 {
        self.counters.iter().map(ThreadCounters::tb_hits).sum()
    }
}

impl std::fmt::Debug for ExternalShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalShared")
            .field("options", &self.options)
            .field("threads", &self.counters.len())
            .finish_non_exhaustive()
    }
}
