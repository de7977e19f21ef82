//! OS threads that host the search workers.
//!
//! Each [`Thread`] owns one native thread parked in an idle loop. The pool
//! wakes it to run one search session; when the session ends the thread
//! goes back to sleep. Threads are only joined when the pool shrinks or is
//! dropped.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use tracing::{debug, trace};

use super::control::lock;
use super::worker::Worker;
use super::{VALUE_INFINITE, Value};
use crate::error::EngineError;
use crate::time::TimeManager;

/// Stack size of search threads; the recursion goes up to `MAX_PLY` deep.
const SEARCH_STACK_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadState {
    Idle,
    Searching,
    Exiting,
}

/// The part of a thread that other threads may touch: its lifecycle state
/// and its worker.
pub struct ThreadShared {
    idx: usize,
    state: Mutex<ThreadState>,
    cv: Condvar,
    worker: Mutex<Worker>,
}

impl ThreadShared {
    /// Lock the worker. Only succeeds promptly while the thread is idle.
    pub fn lock_worker(&self) -> MutexGuard<'_, Worker> {
        lock(&self.worker)
    }

    pub fn id(&self) -> usize {
        self.idx
    }

    /// Wake the thread to run one session with the state already prepared
    /// in its worker.
    pub(crate) fn start_searching(&self) {
        let mut state = lock(&self.state);
        *state = ThreadState::Searching;
        self.cv.notify_all();
    }

    /// Block until the thread is back in its idle loop.
    pub(crate) fn wait_for_search_finished(&self) {
        let mut state = lock(&self.state);
        while *state == ThreadState::Searching {
            state = self.cv.wait(state).unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    fn idle_loop(&self) {
        loop {
            let mut state = lock(&self.state);
            if *state == ThreadState::Searching {
                *state = ThreadState::Idle;
                self.cv.notify_all();
            }
            while *state == ThreadState::Idle {
                state = self.cv.wait(state).unwrap_or_else(std::sync::PoisonError::into_inner);
            }
            if *state == ThreadState::Exiting {
                return;
            }
            drop(state);

            trace!(thread = self.idx, "session start");
            self.lock_worker().start_searching();
            trace!(thread = self.idx, "session end");
        }
    }
}

/// State only the main thread keeps between sessions.
pub struct MainThread {
    pub(crate) tm: TimeManager,
    pub(crate) calls_cnt: i32,
    pub(crate) best_previous_score: Value,
    pub(crate) best_previous_average_score: Value,
    pub(crate) previous_time_reduction: f64,
    /// Best values of the last four iterations, for the falling-eval factor.
    pub(crate) iter_value: [Value; 4],
    /// The helpers whose results the main thread collects.
    pub(crate) helpers: Vec<Arc<ThreadShared>>,
}

impl MainThread {
    pub(crate) fn new(helpers: Vec<Arc<ThreadShared>>) -> Self {
        Self {
            tm: TimeManager::default(),
            calls_cnt: 0,
            best_previous_score: VALUE_INFINITE,
            best_previous_average_score: VALUE_INFINITE,
            previous_time_reduction: 1.0,
            iter_value: [0; 4],
            helpers,
        }
    }

    /// Forget previous searches (new game).
    pub(crate) fn clear(&mut self) {
        self.calls_cnt = 0;
        self.best_previous_score = VALUE_INFINITE;
        self.best_previous_average_score = VALUE_INFINITE;
        self.previous_time_reduction = 1.0;
        self.iter_value = [0; 4];
    }
}

/// A native search thread and its handle.
pub struct Thread {
    shared: Arc<ThreadShared>,
    handle: Option<JoinHandle<()>>,
}

impl Thread {
    /// Start a thread hosting `worker` and wait until it is idle.
    pub(crate) fn spawn(worker: Worker) -> Result<Thread, EngineError> {
        let idx = worker.id();
        let shared = Arc::new(ThreadShared {
            idx,
            // the idle loop flips this to Idle once it runs
            state: Mutex::new(ThreadState::Searching),
            cv: Condvar::new(),
            worker: Mutex::new(worker),
        });

        let runner = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(format!("sable-search-{idx}"))
            .stack_size(SEARCH_STACK_SIZE)
            .spawn(move || runner.idle_loop())
            .map_err(|source| EngineError::Spawn { index: idx, source })?;

        shared.wait_for_search_finished();
        debug!(thread = idx, "search thread started");
        Ok(Thread {
            shared,
            handle: Some(handle),
        })
    }

    pub fn shared(&self) -> &Arc<ThreadShared> {
        &self.shared
    }

    pub(crate) fn start_searching(&self) {
        self.shared.start_searching();
    }

    pub(crate) fn wait_for_search_finished(&self) {
        self.shared.wait_for_search_finished();
    }

    pub fn lock_worker(&self) -> MutexGuard<'_, Worker> {
        self.shared.lock_worker()
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        self.shared.wait_for_search_finished();
        {
            let mut state = lock(&self.shared.state);
            *state = ThreadState::Exiting;
            self.shared.cv.notify_all();
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!(thread = self.shared.idx, "search thread panicked");
        }
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("idx", &self.shared.idx)
            .field("state", &*lock(&self.shared.state))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EngineOptions;
    use crate::search::ExternalShared;
    use crate::search::control::{SearchControl, ThreadCounters};
    use crate::search::report::NoopListener;
    use crate::search::tt::TranspositionTable;

    fn shared() -> ExternalShared {
        ExternalShared {
            options: Arc::new(EngineOptions::default()),
            tt: Arc::new(TranspositionTable::new(1)),
            control: Arc::new(SearchControl::new(false)),
            counters: (0..1).map(|_| ThreadCounters::default()).collect(),
            listener: Arc::new(NoopListener),
        }
    }

    #[test]
    fn spawned_thread_is_idle_and_joins_on_drop() {
        let thread = Thread::spawn(Worker::new(3, shared(), None)).unwrap();
        assert_eq!(thread.shared().id(), 3);
        assert_eq!(*lock(&thread.shared.state), ThreadState::Idle);
        drop(thread);
    }

    #[test]
    fn empty_session_returns_to_idle() {
        // a helper without root moves finishes at once
        let thread = Thread::spawn(Worker::new(1, shared(), None)).unwrap();
        thread.start_searching();
        thread.wait_for_search_finished();
        assert_eq!(*lock(&thread.shared.state), ThreadState::Idle);
        assert_eq!(thread.lock_worker().completed_depth(), 0);
    }
}
