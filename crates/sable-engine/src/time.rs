//! Time management: turn clock parameters into an optimum and a maximum
//! thinking time for one move.

use std::time::{Duration, Instant};

use sable_core::{Color, Position};

use crate::eval::phase::game_phase;
use crate::options::EngineOptions;
use crate::search::limits::SearchLimits;

/// Optimum and maximum thinking time.
///
/// The main thread stops starting new iterations around `optimum` (scaled
/// by how stable the search looks) and aborts the running iteration at
/// `maximum`. With `npmsec` set, time used is measured in nodes searched
/// rather than on the wall clock.
#[derive(Debug, Clone)]
pub struct TimeManager {
    start: Instant,
    optimum: Duration,
    maximum: Duration,
    npmsec: u64,
}

impl TimeManager {
    /// Budget for the side to move of `pos`. Without a clock both limits are
    /// unbounded and only `elapsed` is meaningful.
    pub fn new(limits: &SearchLimits, pos: &Position, options: &EngineOptions) -> Self {
        let start = limits.start_time;
        if !limits.use_time_management() {
            return Self {
                start,
                optimum: Duration::MAX,
                maximum: Duration::MAX,
                npmsec: 0,
            };
        }

        let us: Color = pos.side_to_move();
        let moves_to_go = (limits.moves_to_go > 0).then_some(limits.moves_to_go);
        let (soft, hard) = compute_limits(
            limits.time_left(us),
            limits.increment(us),
            moves_to_go,
            game_phase(pos),
            options.move_overhead,
        );
        // the opponent's thinking time is ours to use while pondering
        let optimum = if options.ponder { soft + soft / 4 } else { soft };
        Self {
            start,
            optimum: optimum.min(hard),
            maximum: hard,
            npmsec: limits.npmsec,
        }
    }

    /// Time used so far. In nodes-as-time mode this is `nodes / npmsec`
    /// milliseconds, independent of the wall clock.
    pub fn elapsed(&self, nodes: u64) -> Duration {
        if self.npmsec > 0 {
            Duration::from_millis(nodes / self.npmsec)
        } else {
            self.start.elapsed()
        }
    }

    /// The optimum time converted to nodes; `None` on the wall clock.
    pub fn node_budget(&self) -> Option<u64> {
        (self.npmsec > 0).then(|| (self.optimum.as_millis() as u64).saturating_mul(self.npmsec))
    }

    pub fn optimum(&self) -> Duration {
        self.optimum
    }

    pub fn maximum(&self) -> Duration {
        self.maximum
    }
}

impl Default for TimeManager {
    fn default() -> Self {
        Self {
            start: Instant::now(),
            optimum: Duration::MAX,
            maximum: Duration::MAX,
            npmsec: 0,
        }
    }
}

/// Soft and hard limits from remaining time and increment.
///
/// Without `moves_to_go` the number of moves still to play is estimated
/// from the game phase (0 = endgame, 24 = opening), so the engine spends
/// less per move early and more once the game simplifies:
///
/// | Condition   | base | scale | Phase 24 | Phase 12 | Phase 0 |
/// |-------------|------|-------|----------|----------|---------|
/// | With inc    | 15   | 20    | 35       | 25       | 15      |
/// | No inc      | 18   | 22    | 40       | 29       | 18      |
///
/// The hard limit is capped at 12% (25% with increment) of the usable time
/// and at 2.5x (3x) the soft limit.
pub fn compute_limits(
    remaining: Duration,
    increment: Duration,
    moves_to_go: Option<u32>,
    phase: i32,
    overhead: Duration,
) -> (Duration, Duration) {
    let remaining_ms = remaining.as_millis() as f64;
    let overhead_ms = overhead.as_millis() as f64;
    if remaining_ms <= overhead_ms + 1.0 {
        let one_ms = Duration::from_millis(1);
        return (one_ms, one_ms);
    }

    let usable = (remaining_ms - overhead_ms).max(1.0);
    let inc_ms = increment.as_millis() as f64;
    let has_increment = inc_ms > 0.0;

    let mtg = match moves_to_go {
        Some(n) => f64::from(n.max(1)),
        None => {
            let (base, scale) = if has_increment { (15, 20) } else { (18, 22) };
            f64::from(base + scale * phase.clamp(0, 24) / 24)
        }
    };

    let base = usable / mtg;
    let soft = if has_increment { base + inc_ms * 0.75 } else { base };
    let (cap, ratio) = if has_increment { (0.25, 3.0) } else { (0.12, 2.5) };
    let hard = (usable * cap).min(soft * ratio);

    let soft = soft.min(usable).max(1.0);
    let hard = hard.min(usable).max(soft.min(usable));
    (Duration::from_millis(soft as u64), Duration::from_millis(hard as u64))
}
