//! Lazy SMP thread pool.
//!
//! Every thread searches the same root position with its own worker; the
//! threads share nothing but the transposition table, the session control
//! block and the node counters. Diversity comes from helpers starting at
//! different depths and from the timing noise of the shared table.

use std::collections::HashMap;
use std::sync::{Arc, MutexGuard};

use sable_core::{Move, PackedMove, Position};
use tracing::{debug, warn};

use super::control::{SearchControl, ThreadCounters};
use super::limits::SearchLimits;
use super::report::{NoopListener, SearchListener, SearchResult};
use super::root_move::{RootMove, RootMoves};
use super::thread::{MainThread, Thread};
use super::tt::TranspositionTable;
use super::worker::Worker;
use super::{ExternalShared, VALUE_INFINITE, Value, is_loss, is_win};
use crate::error::EngineError;
use crate::options::EngineOptions;

/// Added to every thread's score margin over the worst thread before it
/// is weighted by depth, so even the worst thread's move gets some votes.
pub const VOTE_SCORE_OFFSET: i64 = 14;

/// On equal votes, a thread whose PV is longer than this replaces one whose
/// PV is not; a longer line means the move was actually searched through.
pub const VOTE_MIN_PV_LEN: usize = 2;

/// Score, move and PV length of a worker's best root move.
fn head(w: &Worker) -> Option<(Value, PackedMove, usize)> {
    w.root_moves
        .first()
        .map(|rm| (rm.score, PackedMove::new(rm.mv()), rm.pv.len()))
}

/// Pick the thread whose first root move gets played.
///
/// Each thread votes for its best move with weight
/// `(score - min_score + VOTE_SCORE_OFFSET) * completed_depth`. Proven wins
/// are preferred outright (the shortest one wins), proven losses are only
/// kept when nothing better exists, and otherwise the move with the most
/// votes wins. Returns an index into `workers`; 0 when in doubt.
pub fn best_thread_index(workers: &[&Worker]) -> usize {
    let Some(best0) = workers.first().and_then(|w| head(w)) else {
        return 0;
    };

    let min_score = workers
        .iter()
        .filter_map(|w| head(w))
        .map(|(score, _, _)| score)
        .filter(|&s| s != -VALUE_INFINITE)
        .min()
        .unwrap_or(best0.0);

    let mut votes: HashMap<PackedMove, i64> = HashMap::with_capacity(workers.len());
    for w in workers {
        if let Some((score, mv, _)) = head(w)
            && score != -VALUE_INFINITE
        {
            *votes.entry(mv).or_default() +=
                (i64::from(score) - i64::from(min_score) + VOTE_SCORE_OFFSET) * i64::from(w.completed_depth);
        }
    }
    let votes_for = |mv: PackedMove| votes.get(&mv).copied().unwrap_or(0);

    let mut best_idx = 0;
    let mut best = best0;
    for (i, w) in workers.iter().enumerate().skip(1) {
        let Some(th) = head(w) else {
            continue;
        };
        let (score, mv, pv_len) = th;
        let replace = if is_win(best.0) || is_loss(best.0) {
            // shortest mate, or longest resistance when lost
            score > best.0
        } else {
            is_win(score)
                || (!is_loss(score)
                    && (votes_for(mv) > votes_for(best.1)
                        || (votes_for(mv) == votes_for(best.1)
                            && pv_len > VOTE_MIN_PV_LEN
                            && best.2 <= VOTE_MIN_PV_LEN)))
        };
        if replace {
            best_idx = i;
            best = th;
        }
    }
    best_idx
}

/// Owns the search threads and the state they share across sessions.
pub struct ThreadPool {
    /// Index 0 is the main thread.
    threads: Vec<Thread>,
    options: EngineOptions,
    tt: Arc<TranspositionTable>,
    control: Arc<SearchControl>,
    counters: Arc<[ThreadCounters]>,
    listener: Arc<dyn SearchListener>,
}

impl ThreadPool {
    /// Allocate the transposition table and start `options.threads` threads.
    pub fn new(options: EngineOptions) -> Result<Self, EngineError> {
        let mut pool = Self {
            threads: Vec::new(),
            tt: Arc::new(TranspositionTable::new(options.hash_mb)),
            control: Arc::new(SearchControl::new(false)),
            counters: Arc::from(Vec::new()),
            listener: Arc::new(NoopListener),
            options,
        };
        pool.set(pool.options.threads)?;
        Ok(pool)
    }

    /// Receive progress of future searches.
    pub fn set_listener(&mut self, listener: Arc<dyn SearchListener>) {
        self.listener = listener;
    }

    /// Replace all threads with `n` fresh ones (at least one). Histories
    /// start empty; the transposition table is kept.
    pub fn set(&mut self, n: usize) -> Result<(), EngineError> {
        self.wait_for_search_finished();
        // dropping a thread joins it
        self.threads.clear();

        let n = n.max(1);
        self.options.threads = n;
        self.counters = (0..n).map(|_| ThreadCounters::default()).collect();

        let mut helpers = Vec::with_capacity(n - 1);
        for idx in 1..n {
            helpers.push(Thread::spawn(Worker::new(idx, self.shared(), None))?);
        }
        let handles = helpers.iter().map(|t| Arc::clone(t.shared())).collect();
        let main = Thread::spawn(Worker::new(0, self.shared(), Some(MainThread::new(handles))))?;

        self.threads.push(main);
        self.threads.extend(helpers);
        debug!(threads = n, "thread pool ready");
        Ok(())
    }

    fn shared(&self) -> ExternalShared {
        ExternalShared {
            options: Arc::new(self.options.clone()),
            tt: Arc::clone(&self.tt),
            control: Arc::clone(&self.control),
            counters: Arc::clone(&self.counters),
            listener: Arc::clone(&self.listener),
        }
    }

    /// Start searching `pos` in the background and return at once.
    ///
    /// A thread-count or hash-size change in `options` is applied first.
    /// When `limits.search_moves` excludes every legal move the search has no
    /// root moves and reports no best move.
    pub fn start_thinking(
        &mut self,
        options: &EngineOptions,
        pos: &Position,
        limits: SearchLimits,
        ponder: bool,
    ) -> Result<(), EngineError> {
        self.wait_for_search_finished();

        if options.hash_mb != self.options.hash_mb {
            self.resize_tt(options.hash_mb);
        }
        let threads = options.threads.max(1);
        self.options = options.clone();
        if threads != self.threads.len() {
            self.set(threads)?;
        }

        self.control = Arc::new(SearchControl::new(ponder));

        let root_moves: RootMoves = pos
            .legal_moves()
            .iter()
            .filter(|mv| limits.search_moves.is_empty() || limits.search_moves.contains(mv))
            .cloned()
            .map(RootMove::new)
            .collect();
        if root_moves.is_empty() && !limits.search_moves.is_empty() {
            warn!(requested = limits.search_moves.len(), "no legal move among the requested search moves");
        }

        for counters in self.counters.iter() {
            counters.reset();
        }
        // every thread stamps its first store with the new generation
        self.tt.new_search();
        let shared = self.shared();
        debug!(
            threads = self.threads.len(),
            root_moves = root_moves.len(),
            depth = limits.depth,
            nodes = limits.nodes,
            infinite = limits.infinite,
            ponder,
            "search session start"
        );

        for thread in &self.threads {
            thread
                .lock_worker()
                .prepare(shared.clone(), pos, root_moves.clone(), limits.clone());
        }

        // helpers first: the main thread waits for every helper it knows of
        for thread in self.threads.iter().skip(1) {
            thread.start_searching();
        }
        self.threads[0].start_searching();
        Ok(())
    }

    /// Block until every thread is idle.
    pub fn wait_for_search_finished(&self) {
        for thread in &self.threads {
            thread.wait_for_search_finished();
        }
    }

    /// Lock the worker whose result the vote prefers. Blocks while a search
    /// is running.
    pub fn get_best_thread(&self) -> MutexGuard<'_, Worker> {
        let mut guards: Vec<_> = self.threads.iter().map(Thread::lock_worker).collect();
        let idx = {
            let workers: Vec<&Worker> = guards.iter().map(|g| &**g).collect();
            best_thread_index(&workers)
        };
        guards.swap_remove(idx)
    }

    /// Result reported by the last finished session.
    pub fn result(&self) -> Option<SearchResult> {
        self.control.result()
    }

    /// Move reported by the last finished session.
    pub fn best_move(&self) -> Option<Move> {
        self.result().and_then(|r| r.best_move)
    }

    /// Nodes searched by all threads in the current session.
    pub fn nodes_searched(&self) -> u64 {
        self.counters.iter().map(ThreadCounters::nodes).sum()
    }

    pub fn tb_hits(&self) -> u64 {
        self.counters.iter().map(ThreadCounters::tb_hits).sum()
    }

    /// Ask the running search to finish; the result is still reported.
    pub fn stop(&self) {
        self.control.stop();
    }

    /// The expected move was played while pondering.
    pub fn ponderhit(&self) {
        self.control.ponderhit();
    }

    /// Control block of the current session.
    pub fn control(&self) -> &Arc<SearchControl> {
        &self.control
    }

    /// Forget everything learned so far (new game).
    pub fn clear(&mut self) {
        self.wait_for_search_finished();
        self.tt.clear();
        for thread in &self.threads {
            thread.lock_worker().clear();
        }
        debug!("search state cleared");
    }

    /// Replace the transposition table with an empty one of `mb` megabytes.
    pub fn resize_tt(&mut self, mb: usize) {
        self.wait_for_search_finished();
        self.tt = Arc::new(TranspositionTable::new(mb));
        self.options.hash_mb = mb;
    }

    /// Number of threads, main thread included.
    pub fn size(&self) -> usize {
        self.threads.len()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
        self.wait_for_search_finished();
        self.threads.clear();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("threads", &self.threads.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{VALUE_TB_LOSS_IN_MAX_PLY, mate_in};

    fn shared() -> ExternalShared {
        ExternalShared {
            options: Arc::new(EngineOptions::default()),
            tt: Arc::new(TranspositionTable::new(1)),
            control: Arc::new(SearchControl::new(false)),
            counters: (0..4).map(|_| ThreadCounters::default()).collect(),
            listener: Arc::new(NoopListener),
        }
    }

    /// A worker whose best root move is `uci` with `score` at `depth`.
    fn worker(idx: usize, uci: &str, score: i32, depth: i32, pv_len: usize) -> Worker {
        let pos = Position::startpos();
        let mut w = Worker::new(idx, shared(), None);
        let mut rm = RootMove::new(pos.parse_uci(uci).unwrap());
        rm.score = score;
        // pad the PV; only its length matters for voting
        while rm.pv.len() < pv_len {
            let mv = rm.pv[0].clone();
            rm.pv.push(mv);
        }
        w.root_moves = vec![rm];
        w.completed_depth = depth;
        w
    }

    #[test]
    fn majority_beats_single_deeper_thread() {
        let a = worker(0, "e2e4", 30, 10, 5);
        let b = worker(1, "d2d4", 40, 10, 5);
        let c = worker(2, "d2d4", 35, 10, 5);
        assert_eq!(best_thread_index(&[&a, &b, &c]), 1);
    }

    #[test]
    fn depth_weights_votes() {
        let a = worker(0, "e2e4", 30, 20, 5);
        let b = worker(1, "d2d4", 30, 5, 5);
        assert_eq!(best_thread_index(&[&a, &b]), 0);
    }

    #[test]
    fn proven_win_is_preferred() {
        let a = worker(0, "e2e4", 500, 20, 5);
        let b = worker(1, "d2d4", mate_in(7), 3, 7);
        let c = worker(2, "c2c4", mate_in(3), 3, 3);
        assert_eq!(best_thread_index(&[&a, &b, &c]), 2);
    }

    #[test]
    fn proven_loss_is_not_chosen_by_votes() {
        let a = worker(0, "e2e4", -100, 10, 5);
        let b = worker(1, "d2d4", VALUE_TB_LOSS_IN_MAX_PLY - 5, 30, 5);
        assert_eq!(best_thread_index(&[&a, &b]), 0);
    }

    #[test]
    fn longer_pv_breaks_vote_ties() {
        let a = worker(0, "e2e4", 20, 10, 1);
        let b = worker(1, "e2e4", 20, 10, 6);
        assert_eq!(best_thread_index(&[&a, &b]), 1);
    }

    #[test]
    fn unsearched_thread_is_ignored() {
        let a = worker(0, "e2e4", 20, 4, 3);
        let b = worker(1, "d2d4", -VALUE_INFINITE, 0, 1);
        assert_eq!(best_thread_index(&[&a, &b]), 0);
    }

    #[test]
    fn pool_resizes() {
        let mut pool = ThreadPool::new(EngineOptions {
            threads: 2,
            hash_mb: 1,
            ..EngineOptions::default()
        })
        .unwrap();
        assert_eq!(pool.size(), 2);
        pool.set(3).unwrap();
        assert_eq!(pool.size(), 3);
        pool.set(0).unwrap();
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn generation_advances_before_threads_start() {
        let options = EngineOptions {
            threads: 3,
            hash_mb: 1,
            ..EngineOptions::default()
        };
        let mut pool = ThreadPool::new(options.clone()).unwrap();
        let before = pool.tt.generation();
        pool.start_thinking(&options, &Position::startpos(), SearchLimits::infinite(), false)
            .unwrap();
        // checked while the threads are still searching
        assert_eq!(pool.tt.generation(), (before + 1) & 0x1F);
        pool.stop();
        pool.wait_for_search_finished();
        assert_eq!(pool.tt.generation(), (before + 1) & 0x1F);
    }
}
