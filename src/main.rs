//! Fixed-depth benchmark over a handful of positions.
//!
//! Configured through the environment: `SABLE_THREADS`, `SABLE_HASH` (MB),
//! `SABLE_DEPTH` and `SABLE_MOVETIME` (ms, overrides the depth). Logging
//! honours `RUST_LOG`.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use sable_core::Position;
use sable_engine::{EngineOptions, IterationInfo, SearchLimits, SearchListener, SearchResult, ThreadPool, format_score};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const BENCH_FENS: &[&str] = &[
    "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    "r1bq1rk1/ppp2ppp/2np1n2/2b1p3/2B1P3/2NP1N2/PPP2PPP/R1BQ1RK1 w - - 0 7",
    "4rrk1/pp1n3p/3q2pQ/2p1pb2/2PP4/2P3N1/P2B2PP/4RRK1 b - - 7 19",
    "6k1/6p1/6Pp/ppp5/3pn2P/1P3K2/1PP2P2/3N4 b - - 0 1",
];

const DEFAULT_DEPTH: i32 = 10;

/// Logs every finished iteration of the main line.
struct TraceListener;

impl SearchListener for TraceListener {
    fn on_iteration(&self, info: &IterationInfo<'_>) {
        if info.multipv == 1 {
            info!(
                depth = info.depth,
                seldepth = info.sel_depth,
                score = %format_score(info.score),
                nodes = info.nodes,
                nps = info.nps,
                pv = %info.pv_string(),
                "info"
            );
        }
    }

    fn on_best_move(&self, result: &SearchResult) {
        let best = result.best_move.as_ref().map(Position::to_uci);
        let ponder = result.ponder_move.as_ref().map(Position::to_uci);
        info!(
            bestmove = best.as_deref().unwrap_or("(none)"),
            ponder = ponder.as_deref().unwrap_or("-"),
            "bestmove"
        );
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().with_context(|| format!("invalid {name}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let defaults = EngineOptions::default();
    let options = EngineOptions {
        threads: env_or("SABLE_THREADS", defaults.threads)?,
        hash_mb: env_or("SABLE_HASH", defaults.hash_mb)?,
        ..defaults
    };
    let depth: i32 = env_or("SABLE_DEPTH", DEFAULT_DEPTH)?;
    let move_time: u64 = env_or("SABLE_MOVETIME", 0)?;

    info!(threads = options.threads, hash_mb = options.hash_mb, depth, move_time, "sable bench");

    let mut pool = ThreadPool::new(options.clone()).context("failed to start the search threads")?;
    pool.set_listener(Arc::new(TraceListener));

    let start = Instant::now();
    let mut total_nodes = 0u64;
    for (i, fen) in BENCH_FENS.iter().enumerate() {
        let pos = Position::from_fen(fen).with_context(|| format!("bench position {} is invalid", i + 1))?;
        let limits = if move_time > 0 {
            SearchLimits::move_time(Duration::from_millis(move_time))
        } else {
            SearchLimits::depth(depth)
        };

        info!(position = i + 1, fen, "searching");
        pool.start_thinking(&options, &pos, limits, false)?;
        pool.wait_for_search_finished();
        match pool.result() {
            Some(result) => total_nodes += result.nodes,
            None => warn!(position = i + 1, "search finished without a result"),
        }
        pool.clear();
    }

    let elapsed = start.elapsed();
    let nps = total_nodes * 1000 / (elapsed.as_millis().max(1) as u64);
    info!(nodes = total_nodes, ms = elapsed.as_millis() as u64, nps, "bench finished");
    Ok(())
}
