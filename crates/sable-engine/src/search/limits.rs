//! What a search session is allowed to spend.

use std::time::{Duration, Instant};

use sable_core::{Color, Move, color_index};

/// Limits for one search session, as given by the caller.
///
/// A zero or empty field means "no limit of this kind". The clock fields
/// only switch on time management; `move_time`, `depth`, `nodes` and
/// `mate` are enforced on their own.
#[derive(Debug, Clone)]
pub struct SearchLimits {
    /// Remaining clock time, indexed by colour.
    pub time: [Duration; 2],
    /// Increment per move, indexed by colour.
    pub inc: [Duration; 2],
    /// Moves until the next time control, 0 for sudden death.
    pub moves_to_go: u32,
    /// Nodes per millisecond. When set, the clock is spent in nodes: every
    /// `npmsec` nodes searched count as one millisecond used.
    pub npmsec: u64,
    /// Fixed time for this move.
    pub move_time: Option<Duration>,
    /// Maximum iteration depth.
    pub depth: i32,
    /// Node budget over all threads.
    pub nodes: u64,
    /// Stop once a mate in this many moves is proven.
    pub mate: i32,
    /// Count leaves to this depth instead of searching.
    pub perft: u32,
    /// Search until told to stop.
    pub infinite: bool,
    /// Only these root moves are considered.
    pub search_moves: Vec<Move>,
    /// When the request arrived; all time limits count from here.
    pub start_time: Instant,
}

impl SearchLimits {
    /// No limits at all. Such a search never stops by itself.
    pub fn new() -> Self {
        Self {
            time: [Duration::ZERO; 2],
            inc: [Duration::ZERO; 2],
            moves_to_go: 0,
            npmsec: 0,
            move_time: None,
            depth: 0,
            nodes: 0,
            mate: 0,
            perft: 0,
            infinite: false,
            search_moves: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Search to a fixed depth.
    pub fn depth(depth: i32) -> Self {
        Self {
            depth,
            ..Self::new()
        }
    }

    /// Search a fixed number of nodes.
    pub fn nodes(nodes: u64) -> Self {
        Self {
            nodes,
            ..Self::new()
        }
    }

    /// Search for a fixed time.
    pub fn move_time(time: Duration) -> Self {
        Self {
            move_time: Some(time),
            ..Self::new()
        }
    }

    /// Search until stopped.
    pub fn infinite() -> Self {
        Self {
            infinite: true,
            ..Self::new()
        }
    }

    /// Play on a clock: remaining time and increment for both colours.
    pub fn clock(white: Duration, black: Duration, white_inc: Duration, black_inc: Duration) -> Self {
        Self {
            time: [white, black],
            inc: [white_inc, black_inc],
            ..Self::new()
        }
    }

    /// Count leaf nodes to `depth` instead of searching.
    pub fn perft(depth: u32) -> Self {
        Self {
            perft: depth,
            ..Self::new()
        }
    }

    /// Whether the clock drives the search length.
    pub fn use_time_management(&self) -> bool {
        !self.time[0].is_zero() || !self.time[1].is_zero()
    }

    /// Remaining time of `color`.
    pub fn time_left(&self, color: Color) -> Duration {
        self.time[color_index(color)]
    }

    /// Increment of `color`.
    pub fn increment(&self, color: Color) -> Duration {
        self.inc[color_index(color)]
    }
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_management_needs_a_clock() {
        assert!(!SearchLimits::depth(5).use_time_management());
        assert!(!SearchLimits::move_time(Duration::from_millis(100)).use_time_management());
        let clock = SearchLimits::clock(
            Duration::from_secs(60),
            Duration::ZERO,
            Duration::from_secs(1),
            Duration::ZERO,
        );
        assert!(clock.use_time_management());
        assert_eq!(clock.time_left(Color::White), Duration::from_secs(60));
        assert_eq!(clock.increment(Color::White), Duration::from_secs(1));
        assert_eq!(clock.time_left(Color::Black), Duration::ZERO);
    }

    #[test]
    fn constructors_set_one_limit() {
        let limits = SearchLimits::nodes(1_000);
        assert_eq!(limits.nodes, 1_000);
        assert_eq!(limits.depth, 0);
        assert!(!limits.infinite);
        assert!(SearchLimits::infinite().infinite);
        assert_eq!(limits.npmsec, 0, "wall-clock time by default");
        assert_eq!(SearchLimits::perft(3).perft, 3);
    }
}
