//! Session control block and per-thread counters.
//!
//! A [`SearchControl`] is created for every search session and shared by
//! all threads of the pool. The flags are plain atomics: the search polls
//! `is_stopped` at every node, so loads are `Relaxed`. Transitions that a
//! thread may be blocked on (stop, ponderhit) also go through a condition
//! variable so the main thread can sleep instead of spinning.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use super::report::SearchResult;

/// Lock a mutex, recovering the data if another thread panicked with it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Flags shared by every thread of one search session.
#[derive(Debug)]
pub struct SearchControl {
    stop: AtomicBool,
    aborted: AtomicBool,
    increase_depth: AtomicBool,
    ponder: AtomicBool,
    stop_on_ponderhit: AtomicBool,
    gate: Mutex<()>,
    released: Condvar,
    result: Mutex<Option<SearchResult>>,
}

impl SearchControl {
    /// Fresh control block. `ponder` starts the session in pondering mode.
    pub fn new(ponder: bool) -> Self {
        Self {
            stop: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            increase_depth: AtomicBool::new(true),
            ponder: AtomicBool::new(ponder),
            stop_on_ponderhit: AtomicBool::new(false),
            gate: Mutex::new(()),
            released: Condvar::new(),
            result: Mutex::new(None),
        }
    }

    /// Ask every thread to finish as soon as possible.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.notify();
    }

    /// Stop because a hard limit ran out in the middle of an iteration.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
        self.stop();
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Whether the stop came from a hard limit rather than a finished search.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    pub fn is_pondering(&self) -> bool {
        self.ponder.load(Ordering::Relaxed)
    }

    /// The opponent played the expected move: keep searching, now on the
    /// clock. A search that already decided to stop does so now.
    pub fn ponderhit(&self) {
        self.ponder.store(false, Ordering::Relaxed);
        self.notify();
    }

    pub fn stop_on_ponderhit(&self) -> bool {
        self.stop_on_ponderhit.load(Ordering::Relaxed)
    }

    pub fn set_stop_on_ponderhit(&self, value: bool) {
        self.stop_on_ponderhit.store(value, Ordering::Relaxed);
    }

    /// Whether the next iteration should use the full depth increment.
    pub fn increase_depth(&self) -> bool {
        self.increase_depth.load(Ordering::Relaxed)
    }

    pub fn set_increase_depth(&self, value: bool) {
        self.increase_depth.store(value, Ordering::Relaxed);
    }

    /// Block while the search must not report a move yet: until stopped,
    /// and only while pondering or in an infinite search.
    pub fn wait_until_released(&self, infinite: bool) {
        let gate = lock(&self.gate);
        let _gate = self
            .released
            .wait_while(gate, |_| !self.is_stopped() && (self.is_pondering() || infinite))
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Record the move the main thread reported.
    pub fn set_result(&self, result: SearchResult) {
        *lock(&self.result) = Some(result);
    }

    /// The reported result, once the session finished.
    pub fn result(&self) -> Option<SearchResult> {
        lock(&self.result).clone()
    }

    fn notify(&self) {
        // taking the gate orders the flag store before a waiter's re-check
        let _gate = lock(&self.gate);
        self.released.notify_all();
    }
}

/// Counters owned by one thread and read by everyone else.
///
/// Each counter has a single writer, so increments are a relaxed load and
/// store rather than a read-modify-write. `best_move_changes` is the
/// exception: the main thread drains it with `take_best_move_changes`.
#[derive(Debug, Default)]
pub struct ThreadCounters {
    nodes: AtomicU64,
    tb_hits: AtomicU64,
    best_move_changes: AtomicU64,
}

impl ThreadCounters {
    #[inline]
    pub fn nodes(&self) -> u64 {
        self.nodes.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn add_node(&self) {
        self.nodes.store(self.nodes.load(Ordering::Relaxed) + 1, Ordering::Relaxed);
    }

    pub(crate) fn set_nodes(&self, nodes: u64) {
        self.nodes.store(nodes, Ordering::Relaxed);
    }

    pub fn tb_hits(&self) -> u64 {
        self.tb_hits.load(Ordering::Relaxed)
    }

    pub(crate) fn add_best_move_change(&self) {
        self.best_move_changes.fetch_add(1, Ordering::Relaxed);
    }

    /// Read and reset the best-move change count.
    pub(crate) fn take_best_move_changes(&self) -> u64 {
        self.best_move_changes.swap(0, Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.nodes.store(0, Ordering::Relaxed);
        self.tb_hits.store(0, Ordering::Relaxed);
        self.best_move_changes.store(0, Ordering::Relaxed);
    }
}
