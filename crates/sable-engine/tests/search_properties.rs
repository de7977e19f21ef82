//! Properties of a finished search: root move bookkeeping, MultiPV,
//! restricted root moves, determinism and cancellation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use sable_core::{Position, STARTING_FEN};
use sable_engine::search::{VALUE_DRAW, VALUE_INFINITE};
use sable_engine::{EngineOptions, IterationInfo, SearchLimits, SearchListener, SearchResult, ThreadPool};

const MIDDLEGAME_FEN: &str = "r1bq1rk1/ppp2ppp/2np1n2/2b1p3/2B1P3/2NP1N2/PPP2PPP/R1BQ1RK1 w - - 0 7";

const ENDGAME_FEN: &str = "8/8/8/3k4/8/3K4/4P3/8 w - - 0 1";

fn options(threads: usize, multi_pv: usize) -> EngineOptions {
    EngineOptions {
        threads,
        hash_mb: 8,
        multi_pv,
        ..EngineOptions::default()
    }
}

fn run(pool: &mut ThreadPool, options: &EngineOptions, pos: &Position, limits: SearchLimits) -> SearchResult {
    pool.start_thinking(options, pos, limits, false).expect("search starts");
    pool.wait_for_search_finished();
    pool.result().expect("a finished search reports a result")
}

fn fresh_search(fen: &str, limits: SearchLimits, options: &EngineOptions) -> (SearchResult, ThreadPool) {
    let mut pool = ThreadPool::new(options.clone()).expect("thread pool starts");
    let pos = Position::from_fen(fen).unwrap();
    let result = run(&mut pool, options, &pos, limits);
    (result, pool)
}

/// Collects (depth, multipv, first move) of every reported line.
#[derive(Default)]
struct Lines(Mutex<Vec<(i32, usize, String)>>);

impl SearchListener for Lines {
    fn on_iteration(&self, info: &IterationInfo<'_>) {
        let first = info.pv.first().map(Position::to_uci).unwrap_or_default();
        self.0.lock().unwrap().push((info.depth, info.multipv, first));
    }
}

#[test]
fn search_moves_restrict_the_root() {
    let pos = Position::startpos();
    let allowed = vec![pos.parse_uci("a2a3").unwrap(), pos.parse_uci("h2h3").unwrap()];
    let limits = SearchLimits {
        search_moves: allowed.clone(),
        ..SearchLimits::depth(5)
    };
    let (result, pool) = fresh_search(STARTING_FEN, limits, &options(2, 1));

    let best = result.best_move.expect("restricted search still has moves");
    assert!(allowed.contains(&best), "{} was not allowed", Position::to_uci(&best));
    assert_eq!(pool.get_best_thread().root_moves().len(), 2);
}

#[test]
fn search_moves_without_legal_move_yield_no_move() {
    let mut after_e4 = Position::startpos();
    let e4 = after_e4.parse_uci("e2e4").unwrap();
    after_e4.do_move(&e4);
    // a black move is never legal in the start position
    let limits = SearchLimits {
        search_moves: vec![after_e4.parse_uci("e7e5").unwrap()],
        ..SearchLimits::depth(4)
    };
    let (result, _) = fresh_search(STARTING_FEN, limits, &options(1, 1));
    assert!(result.best_move.is_none());
    assert_eq!(result.score, VALUE_DRAW);
}

#[test]
fn multi_pv_reports_distinct_lines() {
    let options = options(1, 3);
    let mut pool = ThreadPool::new(options.clone()).unwrap();
    let lines = Arc::new(Lines::default());
    pool.set_listener(lines.clone());

    let pos = Position::from_fen(MIDDLEGAME_FEN).unwrap();
    run(&mut pool, &options, &pos, SearchLimits::depth(5));

    let lines = lines.0.lock().unwrap();
    let last: Vec<_> = lines.iter().filter(|(depth, _, _)| *depth == 5).collect();
    let indices: HashSet<usize> = last.iter().map(|(_, multipv, _)| *multipv).collect();
    assert_eq!(indices, HashSet::from([1, 2, 3]), "lines at depth 5: {last:?}");

    let firsts: HashSet<&str> = last
        .iter()
        .rev()
        .take(3)
        .map(|(_, _, first)| first.as_str())
        .collect();
    assert_eq!(firsts.len(), 3, "MultiPV lines must start with different moves: {last:?}");
}

#[test]
fn full_multi_pv_orders_every_root_move() {
    let options = options(1, 256);
    let (_, pool) = fresh_search(ENDGAME_FEN, SearchLimits::depth(6), &options);
    let best = pool.get_best_thread();
    let root_moves = best.root_moves();
    assert_eq!(root_moves.len(), Position::from_fen(ENDGAME_FEN).unwrap().legal_moves().len());
    assert!(root_moves.iter().all(|rm| rm.score != -VALUE_INFINITE), "every line has an exact score");
    assert!(
        root_moves.windows(2).all(|w| w[0].score >= w[1].score),
        "root moves must be sorted best first"
    );
}

#[test]
fn deeper_search_visits_more_nodes() {
    let options = options(1, 1);
    let (shallow, _) = fresh_search(MIDDLEGAME_FEN, SearchLimits::depth(3), &options);
    let (deep, _) = fresh_search(MIDDLEGAME_FEN, SearchLimits::depth(5), &options);
    assert!(
        deep.nodes > shallow.nodes,
        "depth 5 ({}) should search more than depth 3 ({})",
        deep.nodes,
        shallow.nodes
    );
}

#[test]
fn single_thread_search_is_deterministic() {
    let options = options(1, 1);
    let (a, _) = fresh_search(MIDDLEGAME_FEN, SearchLimits::depth(6), &options);
    let (b, _) = fresh_search(MIDDLEGAME_FEN, SearchLimits::depth(6), &options);
    assert_eq!(a.best_move, b.best_move);
    assert_eq!(a.score, b.score);
    assert_eq!(a.nodes, b.nodes);
    assert_eq!(a.pv, b.pv);
}

#[test]
fn immediate_stop_still_reports_a_legal_move() {
    let options = options(2, 1);
    let mut pool = ThreadPool::new(options.clone()).unwrap();
    let pos = Position::from_fen(MIDDLEGAME_FEN).unwrap();
    pool.start_thinking(&options, &pos, SearchLimits::infinite(), false).unwrap();
    pool.stop();
    pool.wait_for_search_finished();

    let result = pool.result().expect("a stopped search still reports");
    let best = result.best_move.expect("root has legal moves");
    assert!(pos.legal_moves().contains(&best));
}

#[test]
fn repeated_searches_keep_working() {
    let options = options(2, 1);
    let mut pool = ThreadPool::new(options.clone()).unwrap();
    let mut pos = Position::startpos();
    for _ in 0..6 {
        let result = run(&mut pool, &options, &pos, SearchLimits::depth(4));
        let best = result.best_move.expect("the game is not over yet");
        assert!(pos.legal_moves().contains(&best));
        pos.do_move(&best);
    }
    assert_eq!(pos.game_ply(), 6);
}

#[test]
fn ponder_move_is_a_legal_reply() {
    let (result, _) = fresh_search(MIDDLEGAME_FEN, SearchLimits::depth(6), &options(1, 1));
    let mut pos = Position::from_fen(MIDDLEGAME_FEN).unwrap();
    pos.do_move(result.best_move.as_ref().unwrap());
    if let Some(ponder) = &result.ponder_move {
        assert!(pos.legal_moves().contains(ponder), "ponder move must answer the best move");
    }
}

#[test]
fn depth_one_from_the_start_is_a_quiet_legal_move() {
    let (result, _) = fresh_search(STARTING_FEN, SearchLimits::depth(1), &options(1, 1));
    let best = result.best_move.expect("the start position has moves");
    let legal = Position::startpos().legal_moves();
    assert_eq!(legal.len(), 20);
    assert!(legal.contains(&best));
    assert!(result.score.abs() < 100, "depth 1 scores {}", result.score);
}

#[test]
fn winning_capture_stays_best_across_depths() {
    // Rxd5 wins the queen for nothing
    let fen = "4k3/8/8/3q4/8/8/3R4/4K3 w - - 0 1";
    let options = options(1, 1);
    let mut pool = ThreadPool::new(options.clone()).expect("thread pool starts");
    let lines = Arc::new(Lines::default());
    pool.set_listener(lines.clone());
    let result = run(&mut pool, &options, &Position::from_fen(fen).unwrap(), SearchLimits::depth(8));

    let lines = lines.0.lock().unwrap();
    for depth in 2..=8 {
        let last = lines
            .iter()
            .rev()
            .find(|(d, multipv, _)| *d == depth && *multipv == 1)
            .unwrap_or_else(|| panic!("no line reported at depth {depth}"));
        assert_eq!(last.2, "d2d5", "depth {depth} settled on {}", last.2);
    }
    assert_eq!(result.best_move.as_ref().map(Position::to_uci).as_deref(), Some("d2d5"));
}
