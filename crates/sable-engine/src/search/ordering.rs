//! Move ordering and the late-move-reduction table.
//!
//! The picker scores every move up front and hands them out best first by
//! selection sort, so a cutoff after the first few moves never pays for a
//! full sort. Score bands, high to low:
//!
//! | Band            | Base      | Within the band                           |
//! |-----------------|-----------|-------------------------------------------|
//! | TT move         | `1 << 30` |                                           |
//! | Good noisy      | `1 << 28` | 7 x captured value + capture history      |
//! | Killers/counter | `1 << 27` | first killer, second killer, counter move |
//! | Quiet           | 0         | butterfly + pawn + continuation histories |
//! | Bad noisy       | `-1 << 28`| as good noisy                             |
//!
//! "Noisy" means a capture or a queen promotion; a noisy move is good when
//! it does not lose material by static exchange.

use std::sync::OnceLock;

use sable_core::{Move, MoveList, PackedMove, Position, Role, piece_index};

use super::heuristics::{ContHistKey, Histories};
use super::see::{captured_value, see_ge};
use super::{Depth, Value};

const MAX_MOVES: usize = 256;

const TT_SCORE: i32 = 1 << 30;
const GOOD_NOISY: i32 = 1 << 28;
const REFUTATION: i32 = 1 << 27;
const BAD_NOISY: i32 = -(1 << 28);

/// Continuation keys of the moves 1, 2, 3, 4 and 6 plies back.
pub type ContKeys = [Option<ContHistKey>; 5];

/// Whether a move belongs to the noisy bands.
#[inline]
pub fn is_noisy(mv: &Move) -> bool {
    mv.is_capture() || mv.promotion() == Some(Role::Queen)
}

/// Ordering information for quiet moves at one node.
pub struct QuietContext<'a> {
    pub history: &'a Histories,
    pub cont: ContKeys,
    pub killers: [PackedMove; 2],
    pub counter: PackedMove,
}

/// Sum of the continuation histories that apply to `piece` moving to `to`.
pub fn continuation_score(history: &Histories, cont: &ContKeys, piece: usize, to: usize) -> i32 {
    cont.iter()
        .flatten()
        .map(|key| history.continuation(*key, piece, to))
        .sum()
}

fn noisy_score(pos: &Position, mv: &Move, history: &Histories) -> i32 {
    let piece = piece_index(pos.moved_piece(mv));
    let captured = mv.capture().map_or(0, sable_core::role_index);
    7 * captured_value(mv) + history.capture(piece, mv.to() as usize, captured)
}

fn quiet_score(pos: &Position, mv: &Move, ctx: &QuietContext<'_>) -> i32 {
    let piece = piece_index(pos.moved_piece(mv));
    let to = mv.to() as usize;
    2 * ctx.history.main(pos.side_to_move(), PackedMove::new(mv))
        + 2 * ctx.history.pawn(pos.pawn_key(), piece, to)
        + continuation_score(ctx.history, &ctx.cont, piece, to)
}

/// Yields the legal moves of one node, best first.
pub struct MovePicker {
    moves: MoveList,
    scores: [i32; MAX_MOVES],
    cursor: usize,
    skip_quiets: bool,
}

impl MovePicker {
    /// Picker for the main search: every legal move.
    pub fn new(pos: &Position, moves: MoveList, tt_move: PackedMove, ctx: &QuietContext<'_>) -> Self {
        let mut scores = [0; MAX_MOVES];
        for (mv, score) in moves.iter().zip(scores.iter_mut()) {
            let packed = PackedMove::new(mv);
            *score = if packed == tt_move {
                TT_SCORE
            } else if is_noisy(mv) {
                let raw = noisy_score(pos, mv, ctx.history);
                if see_ge(pos, mv, -raw / 18) { GOOD_NOISY + raw } else { BAD_NOISY + raw }
            } else if packed == ctx.killers[0] {
                REFUTATION + 2
            } else if packed == ctx.killers[1] {
                REFUTATION + 1
            } else if packed == ctx.counter {
                REFUTATION
            } else {
                quiet_score(pos, mv, ctx)
            };
        }
        Self {
            moves,
            scores,
            cursor: 0,
            skip_quiets: false,
        }
    }

    /// Picker for quiescence search. In check every evasion is kept;
    /// otherwise noisy moves, plus quiet checks when `quiet_checks` is set.
    pub fn new_qsearch(
        pos: &Position,
        mut moves: MoveList,
        tt_move: PackedMove,
        quiet_checks: bool,
        ctx: &QuietContext<'_>,
    ) -> Self {
        if !pos.in_check() {
            moves.retain(|mv| is_noisy(mv) || (quiet_checks && pos.gives_check(mv)));
        }
        let mut scores = [0; MAX_MOVES];
        for (mv, score) in moves.iter().zip(scores.iter_mut()) {
            *score = if tt_move.matches(mv) {
                TT_SCORE
            } else if is_noisy(mv) {
                GOOD_NOISY + noisy_score(pos, mv, ctx.history)
            } else {
                quiet_score(pos, mv, ctx)
            };
        }
        Self {
            moves,
            scores,
            cursor: 0,
            skip_quiets: false,
        }
    }

    /// Stop yielding plain quiet moves (killers and the counter move still
    /// come out).
    pub fn skip_quiet_moves(&mut self) {
        self.skip_quiets = true;
    }

    /// Next move by descending score.
    pub fn next(&mut self) -> Option<Move> {
        let len = self.moves.len();
        while self.cursor < len {
            let mut best = self.cursor;
            for i in self.cursor + 1..len {
                if self.scores[i] > self.scores[best] {
                    best = i;
                }
            }
            self.moves.swap(self.cursor, best);
            self.scores.swap(self.cursor, best);
            let idx = self.cursor;
            self.cursor += 1;

            let score = self.scores[idx];
            let plain_quiet = score < REFUTATION && score > BAD_NOISY / 2 && !is_noisy(&self.moves[idx]);
            if self.skip_quiets && plain_quiet {
                continue;
            }
            return Some(self.moves[idx].clone());
        }
        None
    }
}

static REDUCTIONS: OnceLock<[i32; MAX_MOVES]> = OnceLock::new();

fn reductions() -> &'static [i32; MAX_MOVES] {
    REDUCTIONS.get_or_init(|| {
        let mut table = [0; MAX_MOVES];
        for (i, r) in table.iter_mut().enumerate().skip(1) {
            *r = (20.37 * (i as f64).ln()) as i32;
        }
        table
    })
}

/// Late-move reduction in plies. Narrow windows relative to the root window
/// reduce more; positions that are not improving get one extra ply once the
/// base reduction is large.
pub fn reduction(improving: bool, depth: Depth, move_count: i32, delta: Value, root_delta: Value) -> Depth {
    let table = reductions();
    let last = MAX_MOVES as i32 - 1;
    let scale = table[depth.clamp(0, last) as usize] * table[move_count.clamp(0, last) as usize];
    (scale + 1346 - delta * 896 / root_delta.max(1)) / 1024 + i32::from(!improving && scale > 880)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(mut picker: MovePicker) -> Vec<Move> {
        std::iter::from_fn(|| picker.next()).collect()
    }

    fn context(history: &Histories) -> QuietContext<'_> {
        QuietContext {
            history,
            cont: [None; 5],
            killers: [PackedMove::NONE; 2],
            counter: PackedMove::NONE,
        }
    }

    #[test]
    fn yields_every_move_once() {
        let pos = Position::startpos();
        let history = Histories::new();
        let moves = drain(MovePicker::new(&pos, pos.legal_moves(), PackedMove::NONE, &context(&history)));
        assert_eq!(moves.len(), 20);
    }

    #[test]
    fn tt_move_comes_first() {
        let pos = Position::startpos();
        let history = Histories::new();
        let tt = pos.parse_uci("b1c3").unwrap();
        let moves = drain(MovePicker::new(&pos, pos.legal_moves(), PackedMove::new(&tt), &context(&history)));
        assert_eq!(moves[0], tt);
    }

    #[test]
    fn winning_capture_before_killer_before_quiet() {
        let pos = Position::from_fen("4k3/8/8/4p3/3Q4/8/8/4K3 w - - 0 1").unwrap();
        let history = Histories::new();
        let killer = pos.parse_uci("d4a4").unwrap();
        let ctx = QuietContext {
            killers: [PackedMove::new(&killer), PackedMove::NONE],
            ..context(&history)
        };
        let moves = drain(MovePicker::new(&pos, pos.legal_moves(), PackedMove::NONE, &ctx));
        assert_eq!(Position::to_uci(&moves[0]), "d4e5");
        assert_eq!(moves[1], killer);
    }

    #[test]
    fn losing_capture_goes_last() {
        // Qxc5 loses the queen to ...dxc5
        let pos = Position::from_fen("7k/8/3p4/2p5/8/4Q3/8/4K3 w - - 0 1").unwrap();
        let history = Histories::new();
        let moves = drain(MovePicker::new(&pos, pos.legal_moves(), PackedMove::NONE, &context(&history)));
        assert_eq!(Position::to_uci(moves.last().unwrap()), "e3c5");
    }

    #[test]
    fn quiet_history_orders_quiets() {
        let pos = Position::startpos();
        let mut history = Histories::new();
        let favourite = pos.parse_uci("a2a3").unwrap();
        history.update_main(pos.side_to_move(), PackedMove::new(&favourite), 1_000);
        let moves = drain(MovePicker::new(&pos, pos.legal_moves(), PackedMove::NONE, &context(&history)));
        assert_eq!(moves[0], favourite);
    }

    #[test]
    fn skipping_quiets_keeps_noisy_and_killers() {
        let pos = Position::from_fen("4k3/8/8/4p3/3Q4/8/8/4K3 w - - 0 1").unwrap();
        let history = Histories::new();
        let killer = pos.parse_uci("d4a4").unwrap();
        let ctx = QuietContext {
            killers: [PackedMove::new(&killer), PackedMove::NONE],
            ..context(&history)
        };
        let mut picker = MovePicker::new(&pos, pos.legal_moves(), PackedMove::NONE, &ctx);
        picker.skip_quiet_moves();
        let moves = drain(picker);
        assert_eq!(moves.len(), 2);
    }

    #[test]
    fn qsearch_startpos_has_nothing() {
        let pos = Position::startpos();
        let history = Histories::new();
        let picker = MovePicker::new_qsearch(&pos, pos.legal_moves(), PackedMove::NONE, false, &context(&history));
        assert!(drain(picker).is_empty());
    }

    #[test]
    fn qsearch_can_include_quiet_checks() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 0 1").unwrap();
        let history = Histories::new();
        let without =
            drain(MovePicker::new_qsearch(&pos, pos.legal_moves(), PackedMove::NONE, false, &context(&history)));
        let with = drain(MovePicker::new_qsearch(&pos, pos.legal_moves(), PackedMove::NONE, true, &context(&history)));
        assert!(without.is_empty());
        assert!(with.iter().any(|m| Position::to_uci(m) == "a1a8"));
        assert!(with.iter().all(|m| pos.gives_check(m)));
    }

    #[test]
    fn qsearch_in_check_keeps_evasions() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/4q3/4K3 w - - 0 1").unwrap();
        let history = Histories::new();
        let moves =
            drain(MovePicker::new_qsearch(&pos, pos.legal_moves(), PackedMove::NONE, false, &context(&history)));
        assert_eq!(moves.len(), pos.legal_moves().len());
        assert_eq!(Position::to_uci(&moves[0]), "e1e2");
    }

    #[test]
    fn reductions_grow_with_depth_and_move_count() {
        assert!(reduction(true, 10, 20, 10, 10) > reduction(true, 10, 3, 10, 10));
        assert!(reduction(true, 20, 10, 10, 10) > reduction(true, 5, 10, 10, 10));
        assert!(reduction(false, 10, 20, 10, 10) >= reduction(true, 10, 20, 10, 10));
        assert_eq!(reduction(true, 1, 1, 10, 10), 0);
    }
}
