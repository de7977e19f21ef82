//! Per-thread search state and iterative deepening.
//!
//! Every thread of the pool owns one [`Worker`]. Workers never touch each
//! other's state while searching; they meet only in the transposition
//! table, the session control block and the node counters. The main
//! thread's worker additionally carries a [`MainThread`] with the time
//! manager and the handles it needs to collect the helpers' results.

use std::sync::Arc;

use sable_core::Position;
use tracing::{debug, info, trace};

use super::control::ThreadCounters;
use super::heuristics::Histories;
use super::limits::SearchLimits;
use super::pool::best_thread_index;
use super::report::{IterationInfo, SearchResult, pv_to_string};
use super::root_move::RootMoves;
use super::stack::{PvTable, STACK_OFFSET, Stack};
use super::thread::MainThread;
use super::{
    Depth, ExternalShared, MAX_PLY, Root, VALUE_DRAW, VALUE_INFINITE, VALUE_MATE, VALUE_MATE_IN_MAX_PLY,
    VALUE_MATED_IN_MAX_PLY, VALUE_TB_LOSS_IN_MAX_PLY, VALUE_TB_WIN_IN_MAX_PLY, VALUE_ZERO, Value,
};
use crate::time::TimeManager;

/// Iterations slower than this report aspiration failures as they happen.
const REPORT_FAIL_AFTER_MS: u128 = 3_000;

/// Search state of one thread.
pub struct Worker {
    pub(crate) idx: usize,
    pub(crate) shared: ExternalShared,
    pub(crate) main: Option<MainThread>,

    pub(crate) limits: SearchLimits,
    pub(crate) root_pos: Position,
    pub(crate) root_moves: RootMoves,

    pub(crate) root_depth: Depth,
    pub(crate) completed_depth: Depth,
    pub(crate) sel_depth: i32,
    pub(crate) pv_idx: usize,
    pub(crate) pv_last: usize,
    pub(crate) nmp_min_ply: i32,
    pub(crate) root_delta: Value,

    pub(crate) history: Histories,
    pub(crate) stack: Stack,
    pub(crate) pv: PvTable,
}

impl Worker {
    pub(crate) fn new(idx: usize, shared: ExternalShared, main: Option<MainThread>) -> Self {
        Self {
            idx,
            shared,
            main,
            limits: SearchLimits::default(),
            root_pos: Position::startpos(),
            root_moves: RootMoves::new(),
            root_depth: 0,
            completed_depth: 0,
            sel_depth: 0,
            pv_idx: 0,
            pv_last: 0,
            nmp_min_ply: 0,
            root_delta: 1,
            history: Histories::new(),
            stack: Stack::new(),
            pv: PvTable::new(),
        }
    }

    /// Thread index; 0 is the main thread.
    pub fn id(&self) -> usize {
        self.idx
    }

    pub fn is_main(&self) -> bool {
        self.main.is_some()
    }

    /// Root moves, best first once an iteration completed.
    pub fn root_moves(&self) -> &RootMoves {
        &self.root_moves
    }

    /// Deepest fully searched iteration of the last session.
    pub fn completed_depth(&self) -> Depth {
        self.completed_depth
    }

    /// Install a new session. Called by the pool while the thread is idle.
    pub(crate) fn prepare(&mut self, shared: ExternalShared, pos: &Position, root_moves: RootMoves, limits: SearchLimits) {
        self.shared = shared;
        self.root_pos = pos.clone();
        self.root_moves = root_moves;
        self.limits = limits;
        self.root_depth = 0;
        self.completed_depth = 0;
        self.sel_depth = 0;
        self.nmp_min_ply = 0;
    }

    /// Forget everything learned in previous games.
    pub(crate) fn clear(&mut self) {
        self.history.clear();
        if let Some(main) = self.main.as_mut() {
            main.clear();
        }
    }

    #[inline]
    pub(crate) fn counters(&self) -> &ThreadCounters {
        &self.shared.counters[self.idx]
    }

    /// Entry point from the thread's idle loop.
    pub(crate) fn start_searching(&mut self) {
        if self.is_main() {
            self.main_search();
        } else {
            self.iterative_deepening();
        }
    }

    /// The main thread's session: search, wait until a result may be
    /// reported, stop the helpers, pick the best thread and report.
    fn main_search(&mut self) {
        let control = Arc::clone(&self.shared.control);

        if self.limits.perft > 0 {
            let nodes = self.root_pos.perft(self.limits.perft);
            self.counters().set_nodes(nodes);
            info!(depth = self.limits.perft, nodes, "perft finished");
            self.shared.listener.on_perft(nodes);
            control.stop();
            self.wait_for_helpers();
            return;
        }

        let tm = TimeManager::new(&self.limits, &self.root_pos, &self.shared.options);
        debug!(
            optimum = ?tm.optimum(),
            maximum = ?tm.maximum(),
            node_budget = ?tm.node_budget(),
            "time budget"
        );
        if let Some(main) = self.main.as_mut() {
            main.tm = tm;
        }

        if self.root_moves.is_empty() {
            let score = if self.root_pos.in_check() { -VALUE_MATE } else { VALUE_DRAW };
            self.shared.listener.on_iteration(&IterationInfo {
                depth: 0,
                sel_depth: 0,
                multipv: 1,
                score,
                lowerbound: false,
                upperbound: false,
                nodes: 0,
                nps: 0,
                tb_hits: 0,
                hashfull: self.shared.tt.hashfull(),
                elapsed: self.limits.start_time.elapsed(),
                pv: &[],
            });
        } else {
            self.iterative_deepening();
        }

        // a pondering or infinite search may only report once released
        control.wait_until_released(self.limits.infinite);
        control.stop();
        self.wait_for_helpers();

        let (result, average) = self.collect_result();
        if let Some(main) = self.main.as_mut() {
            main.best_previous_score = result.score;
            main.best_previous_average_score = average;
        }
        info!(
            best = result.best_move.as_ref().map(Position::to_uci).as_deref().unwrap_or("(none)"),
            depth = result.depth,
            score = result.score,
            nodes = result.nodes,
            "search finished"
        );
        control.set_result(result.clone());
        self.shared.listener.on_best_move(&result);
    }

    fn wait_for_helpers(&self) {
        if let Some(main) = &self.main {
            for helper in &main.helpers {
                helper.wait_for_search_finished();
            }
        }
    }

    /// Choose the thread whose move gets played and build the result from
    /// it. Also returns that thread's average score for the next search.
    fn collect_result(&mut self) -> (SearchResult, Value) {
        let helpers = self.main.as_ref().map(|m| m.helpers.clone()).unwrap_or_default();
        let mut guards: Vec<_> = helpers.iter().map(|h| h.lock_worker()).collect();

        let vote = self.shared.options.multi_pv == 1 && self.limits.depth == 0 && !self.root_moves.is_empty();
        let best_idx = if vote {
            let mut workers: Vec<&Worker> = Vec::with_capacity(guards.len() + 1);
            workers.push(&*self);
            workers.extend(guards.iter().map(|g| &**g));
            best_thread_index(&workers)
        } else {
            0
        };

        let best: &mut Worker = if best_idx == 0 { self } else { &mut *guards[best_idx - 1] };
        if best_idx != 0 {
            debug!(thread = best.idx, depth = best.completed_depth, "helper thread selected");
            best.report_pv(best.completed_depth);
        }
        if let Some(rm) = best.root_moves.first_mut() {
            rm.extract_ponder_from_tt(&best.shared.tt, &best.root_pos);
        }
        let average = best.root_moves.first().map_or(VALUE_INFINITE, |rm| rm.average_score);
        (best.search_result(), average)
    }

    /// Result as this thread sees it.
    pub(crate) fn search_result(&self) -> SearchResult {
        let nodes = self.shared.nodes_searched();
        let Some(rm) = self.root_moves.first() else {
            return SearchResult {
                best_move: None,
                ponder_move: None,
                pv: Vec::new(),
                score: if self.root_pos.in_check() { -VALUE_MATE } else { VALUE_DRAW },
                depth: 0,
                sel_depth: 0,
                nodes,
            };
        };
        let score = [rm.uci_score, rm.previous_score]
            .into_iter()
            .find(|&v| v != -VALUE_INFINITE)
            .unwrap_or(VALUE_ZERO);
        let ponder_move = rm.pv.get(1).cloned();
        SearchResult {
            best_move: Some(rm.mv().clone()),
            ponder_move,
            pv: rm.pv.clone(),
            score,
            depth: self.completed_depth,
            sel_depth: rm.sel_depth,
            nodes,
        }
    }

    /// Iterative deepening with aspiration windows. Helpers run exactly this;
    /// the main thread also manages time between iterations.
    pub(crate) fn iterative_deepening(&mut self) {
        if self.root_moves.is_empty() || self.limits.perft > 0 {
            return;
        }
        let control = Arc::clone(&self.shared.control);
        let mut pos = self.root_pos.clone();
        let threads = self.shared.counters.len().max(1);

        self.stack.reset();
        self.pv_idx = 0;
        self.pv_last = 0;

        let mut best_value = -VALUE_INFINITE;
        let mut last_best_pv = Vec::new();
        let mut last_best_score = -VALUE_INFINITE;
        let mut last_best_move_depth = 0;
        let mut search_again_counter = 0;
        let mut tot_best_move_changes = 0.0f64;
        let mut time_reduction = 1.0f64;
        let mut iter_idx = 0usize;

        if let Some(main) = self.main.as_mut() {
            let seed = if main.best_previous_score == VALUE_INFINITE { VALUE_ZERO } else { main.best_previous_score };
            main.iter_value = [seed; 4];
        }

        let multi_pv = self.shared.options.multi_pv.clamp(1, self.root_moves.len());
        // odd helpers start one ply deeper so threads spread over depths
        self.root_depth = if self.is_main() { 0 } else { (self.idx % 2) as Depth };

        loop {
            self.root_depth += 1;
            if self.root_depth >= MAX_PLY
                || control.is_stopped()
                || (self.is_main() && self.limits.depth > 0 && self.root_depth > self.limits.depth)
            {
                break;
            }

            if self.is_main() {
                tot_best_move_changes /= 2.0;
            }
            for rm in &mut self.root_moves {
                rm.previous_score = rm.score;
            }

            let mut pv_first = 0;
            self.pv_last = 0;
            if !control.increase_depth() {
                search_again_counter += 1;
            }

            self.pv_idx = 0;
            while self.pv_idx < multi_pv && !control.is_stopped() {
                if self.pv_idx == self.pv_last {
                    pv_first = self.pv_last;
                    self.pv_last += 1;
                    while self.pv_last < self.root_moves.len()
                        && self.root_moves[self.pv_last].tb_rank == self.root_moves[pv_first].tb_rank
                    {
                        self.pv_last += 1;
                    }
                }

                self.sel_depth = 0;
                let avg = self.root_moves[self.pv_idx].average_score;
                let mut delta = 9 + avg * avg / 14_847;
                let mut alpha = (avg - delta).max(-VALUE_INFINITE);
                let mut beta = (avg + delta).min(VALUE_INFINITE);
                let mut failed_high_cnt = 0;

                loop {
                    let adjusted_depth = (self.root_depth - failed_high_cnt - 3 * (search_again_counter + 1) / 4).max(1);
                    best_value = self.search::<Root>(&mut pos, STACK_OFFSET, alpha, beta, adjusted_depth, false);

                    // stable, so moves not searched this time keep their order
                    self.root_moves[self.pv_idx..self.pv_last].sort();

                    if control.is_stopped() {
                        break;
                    }

                    if self.is_main()
                        && multi_pv == 1
                        && (best_value <= alpha || best_value >= beta)
                        && self.limits.start_time.elapsed().as_millis() > REPORT_FAIL_AFTER_MS
                    {
                        self.report_pv(self.root_depth);
                    }

                    if best_value <= alpha {
                        beta = (alpha + beta) / 2;
                        alpha = (best_value - delta).max(-VALUE_INFINITE);
                        failed_high_cnt = 0;
                        if self.is_main() {
                            control.set_stop_on_ponderhit(false);
                        }
                    } else if best_value >= beta {
                        beta = (best_value + delta).min(VALUE_INFINITE);
                        failed_high_cnt += 1;
                    } else {
                        break;
                    }
                    trace!(thread = self.idx, depth = self.root_depth, alpha, beta, "aspiration re-search");
                    delta += delta / 3;
                }

                self.root_moves[pv_first..=self.pv_idx].sort();

                if self.is_main()
                    && (control.is_stopped()
                        || self.pv_idx + 1 == multi_pv
                        || self.limits.start_time.elapsed().as_millis() > REPORT_FAIL_AFTER_MS)
                    && !(control.is_aborted() && self.root_moves[0].uci_score <= VALUE_TB_LOSS_IN_MAX_PLY)
                {
                    self.report_pv(self.root_depth);
                }
                self.pv_idx += 1;
            }

            if !control.is_stopped() {
                self.completed_depth = self.root_depth;
            }

            // an interrupted iteration that only proves a loss is less
            // trustworthy than the last completed best line
            if control.is_aborted()
                && !last_best_pv.is_empty()
                && self.root_moves[0].score != -VALUE_INFINITE
                && self.root_moves[0].score <= VALUE_TB_LOSS_IN_MAX_PLY
            {
                if let Some(i) = self.root_moves.iter().position(|rm| rm.is(&last_best_pv[0])) {
                    self.root_moves[..=i].rotate_right(1);
                }
                let rm = &mut self.root_moves[0];
                rm.pv = last_best_pv.clone();
                rm.score = last_best_score;
                rm.uci_score = last_best_score;
            } else if last_best_pv.first() != Some(self.root_moves[0].mv()) {
                last_best_pv = self.root_moves[0].pv.clone();
                last_best_score = self.root_moves[0].score;
                last_best_move_depth = self.root_depth;
            }

            if !self.is_main() {
                continue;
            }

            let best = &self.root_moves[0];
            if self.limits.mate > 0
                && best.score == best.uci_score
                && ((best.score >= VALUE_MATE_IN_MAX_PLY && VALUE_MATE - best.score <= 2 * self.limits.mate)
                    || (best.score != -VALUE_INFINITE
                        && best.score <= VALUE_MATED_IN_MAX_PLY
                        && VALUE_MATE + best.score <= 2 * self.limits.mate))
            {
                debug!(score = best.score, "requested mate found");
                control.stop();
            }

            for counters in self.shared.counters.iter() {
                tot_best_move_changes += counters.take_best_move_changes() as f64;
            }

            let root_count = self.root_moves.len();
            let Some(main) = self.main.as_mut() else {
                continue;
            };

            if self.limits.use_time_management() && !control.is_stopped() && !control.stop_on_ponderhit() {
                let falling_eval = (f64::from(
                    1067 + 223 * (main.best_previous_average_score - best_value)
                        + 97 * (main.iter_value[iter_idx] - best_value),
                ) / 10_000.0)
                    .clamp(0.580, 1.667);
                time_reduction = if last_best_move_depth + 8 < self.completed_depth { 1.495 } else { 0.687 };
                let reduction = (1.48 + main.previous_time_reduction) / (2.17 * time_reduction);
                let instability = 1.0 + 1.88 * tot_best_move_changes / threads as f64;

                let optimum_ms = main.tm.optimum().as_secs_f64() * 1000.0;
                let mut total_time = optimum_ms * falling_eval * reduction * instability;
                if root_count == 1 {
                    total_time = total_time.min(500.0);
                }

                let elapsed_ms = main.tm.elapsed(self.shared.nodes_searched()).as_secs_f64() * 1000.0;
                if elapsed_ms > total_time {
                    if control.is_pondering() {
                        control.set_stop_on_ponderhit(true);
                    } else {
                        control.stop();
                    }
                } else {
                    control.set_increase_depth(control.is_pondering() || elapsed_ms <= total_time * 0.506);
                }
            }

            main.iter_value[iter_idx] = best_value;
            iter_idx = (iter_idx + 1) & 3;
        }

        if let Some(main) = self.main.as_mut() {
            main.previous_time_reduction = time_reduction;
        }
    }

    /// Main thread only: stop the search when a limit ran out. Reads the
    /// clock every 512 calls (fewer with a small node limit).
    pub(crate) fn check_time(&mut self) {
        let Some(main) = self.main.as_mut() else {
            return;
        };
        main.calls_cnt -= 1;
        if main.calls_cnt > 0 {
            return;
        }
        main.calls_cnt = if self.limits.nodes > 0 { (self.limits.nodes / 1024).min(512) as i32 } else { 512 };

        let control = &self.shared.control;
        // never stop while pondering; ponderhit decides
        if control.is_pondering() {
            return;
        }

        let elapsed = main.tm.elapsed(self.shared.nodes_searched());
        if (self.limits.use_time_management() && (elapsed > main.tm.maximum() || control.stop_on_ponderhit()))
            || self.limits.move_time.is_some_and(|t| elapsed >= t)
            || (self.limits.nodes > 0 && self.shared.nodes_searched() >= self.limits.nodes)
        {
            debug!(?elapsed, "search limit reached");
            control.abort();
        }
    }

    /// Report every PV line up to MultiPV.
    pub(crate) fn report_pv(&self, depth: Depth) {
        let elapsed = self.limits.start_time.elapsed();
        let nodes = self.shared.nodes_searched();
        let nps = nodes * 1000 / (elapsed.as_millis().max(1) as u64);
        let hashfull = self.shared.tt.hashfull();
        let tb_hits = self.shared.tb_hits();
        let multi_pv = self.shared.options.multi_pv.min(self.root_moves.len());

        for (i, rm) in self.root_moves.iter().take(multi_pv).enumerate() {
            let updated = rm.score != -VALUE_INFINITE;
            if depth == 1 && !updated && i > 0 {
                continue;
            }
            let d = if updated { depth } else { (depth - 1).max(1) };
            let mut score = if updated { rm.uci_score } else { rm.previous_score };
            if score == -VALUE_INFINITE {
                score = VALUE_ZERO;
            }
            let bounded = i == self.pv_idx && updated;
            let info = IterationInfo {
                depth: d,
                sel_depth: rm.sel_depth,
                multipv: i + 1,
                score,
                lowerbound: bounded && rm.score_lowerbound,
                upperbound: bounded && !rm.score_lowerbound && rm.score_upperbound,
                nodes,
                nps,
                tb_hits,
                hashfull,
                elapsed,
                pv: &rm.pv,
            };
            if i == 0 {
                debug!(depth = d, score, nodes, pv = %pv_to_string(&rm.pv), "iteration");
            }
            self.shared.listener.on_iteration(&info);
        }
    }

    /// Draw score from the point of view of the side to move at `ply`,
    /// shifted by contempt and jittered by one centipawn so the search does
    /// not settle into repetition lines by accident.
    pub(crate) fn value_draw(&self, ply: i32) -> Value {
        let contempt = self.shared.options.contempt;
        let base = if ply % 2 == 0 { -contempt } else { contempt };
        VALUE_DRAW + base - 1 + (self.counters().nodes() & 0x2) as Value
    }

    /// Static evaluation adjusted by what the search learned about this
    /// pawn structure.
    pub(crate) fn corrected_eval(&self, pos: &Position, raw: Value) -> Value {
        let cv = self.history.correction(pos.side_to_move(), pos.pawn_key());
        (raw + cv * cv.abs() / 12_000).clamp(VALUE_TB_LOSS_IN_MAX_PLY + 1, VALUE_TB_WIN_IN_MAX_PLY - 1)
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("idx", &self.idx)
            .field("is_main", &self.is_main())
            .field("completed_depth", &self.completed_depth)
            .field("root_moves", &self.root_moves.len())
            .finish_non_exhaustive()
    }
}
