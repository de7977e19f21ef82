//! Principal variation search with quiescence.
//!
//! Both searches are methods on [`Worker`] and are monomorphised per
//! [`NodeType`], so the root/PV/non-PV distinctions cost nothing at run time.

use sable_core::{Move, PackedMove, Position, Role, Square, piece_index, role_index};

use super::heuristics::{CORRECTION_HISTORY_LIMIT, ContHistKey};
use super::ordering::{ContKeys, MovePicker, QuietContext, is_noisy, reduction};
use super::see::{captured_value, see_ge};
use super::tt::Bound;
use super::worker::Worker;
use super::{
    DEPTH_NONE, DEPTH_QS_CHECKS, DEPTH_QS_NO_CHECKS, Depth, MAX_PLY, NodeType, NonPv, Pv, VALUE_DRAW,
    VALUE_INFINITE, VALUE_NONE, VALUE_TB_LOSS_IN_MAX_PLY, VALUE_TB_WIN_IN_MAX_PLY, VALUE_ZERO, Value, mate_in,
    mated_in,
};
use crate::eval::evaluate;

/// Searched moves remembered per node for history penalties.
const MAX_SEARCHED: usize = 32;

/// History bonus for a move that caused a cutoff at `depth`.
#[inline]
fn stat_bonus(depth: Depth) -> i32 {
    (268 * depth - 352).min(1153)
}

/// History penalty for a move searched before the cutoff move.
#[inline]
fn stat_malus(depth: Depth) -> i32 {
    (400 * depth - 354).min(1201)
}

#[inline]
fn futility_margin(depth: Depth, no_tt_cut_node: bool, improving: bool) -> Value {
    let mult = 116 - 44 * i32::from(no_tt_cut_node);
    mult * depth - i32::from(improving) * mult * 3 / 2
}

#[inline]
fn futility_move_count(improving: bool, depth: Depth) -> i32 {
    if improving { 3 + depth * depth } else { (3 + depth * depth) / 2 }
}

/// The history coordinates of a move, captured before it is made.
#[derive(Debug, Clone, Copy)]
struct MoveStat {
    packed: PackedMove,
    piece: usize,
    to: usize,
    captured: usize,
    noisy: bool,
}

impl MoveStat {
    const EMPTY: MoveStat = MoveStat {
        packed: PackedMove::NONE,
        piece: 0,
        to: 0,
        captured: 0,
        noisy: false,
    };

    fn new(pos: &Position, mv: &Move) -> Self {
        Self {
            packed: PackedMove::new(mv),
            piece: piece_index(pos.moved_piece(mv)),
            to: mv.to() as usize,
            captured: mv.capture().map_or(0, role_index),
            noisy: is_noisy(mv),
        }
    }

    /// Read a TT move hint off the board without generating moves. `None`
    /// when the source square holds no piece of the side to move.
    fn from_packed(pos: &Position, packed: PackedMove) -> Option<Self> {
        if !packed.is_ok() {
            return None;
        }
        let from = Square::new(u32::from(packed.raw() & 0x3f));
        let to = Square::new(packed.to_index() as u32);
        let board = pos.board();
        let piece = board.piece_at(from).filter(|p| p.color == pos.side_to_move())?;
        let captured = match board.piece_at(to) {
            Some(target) if target.color != piece.color => Some(target.role),
            // castling encodes the own rook square
            Some(_) => None,
            None if piece.role == Role::Pawn && from.file() != to.file() => Some(Role::Pawn),
            None => None,
        };
        let queen_promotion = packed.raw() >> 12 == Role::Queen as u16;
        Some(Self {
            packed,
            piece: piece_index(piece),
            to: to as usize,
            captured: captured.map_or(0, role_index),
            noisy: captured.is_some() || queen_promotion,
        })
    }
}

/// Fixed-capacity list of searched moves.
struct Searched {
    moves: [MoveStat; MAX_SEARCHED],
    len: usize,
}

impl Searched {
    fn new() -> Self {
        Self {
            moves: [MoveStat::EMPTY; MAX_SEARCHED],
            len: 0,
        }
    }

    fn push(&mut self, stat: MoveStat) {
        if self.len < MAX_SEARCHED {
            self.moves[self.len] = stat;
            self.len += 1;
        }
    }

    fn as_slice(&self) -> &[MoveStat] {
        &self.moves[..self.len]
    }
}

impl Worker {
    /// Alpha-beta search of `pos` at stack index `ss`.
    pub(crate) fn search<NT: NodeType>(
        &mut self,
        pos: &mut Position,
        ss: usize,
        mut alpha: Value,
        mut beta: Value,
        mut depth: Depth,
        cut_node: bool,
    ) -> Value {
        let pv_node = NT::PV;
        let root_node = NT::ROOT;

        if depth <= 0 {
            return if pv_node {
                self.qsearch::<Pv>(pos, ss, alpha, beta, DEPTH_QS_CHECKS)
            } else {
                self.qsearch::<NonPv>(pos, ss, alpha, beta, DEPTH_QS_CHECKS)
            };
        }
        debug_assert!(-VALUE_INFINITE <= alpha && alpha < beta && beta <= VALUE_INFINITE);
        debug_assert!(pv_node || alpha == beta - 1);
        depth = depth.min(MAX_PLY - 1);

        let ply = self.stack[ss].ply;
        let us = pos.side_to_move();
        let in_check = pos.in_check();
        let prior_capture = self.stack[ss - 1].cont_hist.is_some_and(|k| k.capture);
        let excluded = self.stack[ss].excluded_move;
        let mut best_value = -VALUE_INFINITE;

        self.stack[ss].in_check = in_check;
        self.stack[ss].move_count = 0;

        self.counters().add_node();
        if self.is_main() {
            self.check_time();
        }

        if pv_node {
            self.pv.clear(ply);
            self.sel_depth = self.sel_depth.max(ply + 1);
        }

        if !root_node {
            if self.shared.control.is_stopped() || pos.is_draw(ply as usize) || ply >= MAX_PLY {
                return if ply >= MAX_PLY && !in_check { self.static_value(pos) } else { self.value_draw(ply) };
            }

            // no line from here can beat a mate already found closer to the root
            alpha = alpha.max(mated_in(ply));
            beta = beta.min(mate_in(ply + 1));
            if alpha >= beta {
                return alpha;
            }
        } else {
            self.root_delta = beta - alpha;
        }

        self.stack[ss + 1].excluded_move = PackedMove::NONE;
        self.stack[ss + 2].killers = [PackedMove::NONE; 2];
        self.stack[ss + 2].cutoff_cnt = 0;
        self.stack[ss].stat_score = 0;
        self.stack[ss].double_extensions = self.stack[ss - 1].double_extensions;

        // Transposition table lookup. A singular verification search keys
        // its results apart from the full search of the same position.
        let pos_key = if excluded.is_none() {
            pos.key()
        } else {
            pos.key() ^ u64::from(excluded.raw()).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        };
        let tte = self.shared.tt.probe(pos_key, ply);
        let tt_hit = tte.is_some();
        self.stack[ss].tt_hit = tt_hit;
        let tt_value = tte.map_or(VALUE_NONE, |e| e.value);
        if excluded.is_none() {
            self.stack[ss].tt_pv = pv_node || tte.is_some_and(|e| e.is_pv);
        }
        let tt_pv = self.stack[ss].tt_pv;

        if !pv_node
            && excluded.is_none()
            && let Some(e) = tte
            && e.depth > depth - i32::from(tt_value <= beta)
            && tt_value != VALUE_NONE
            && e.bound.includes(if tt_value >= beta { Bound::Lower } else { Bound::Upper })
        {
            if let Some(stat) = MoveStat::from_packed(pos, e.best_move)
                && tt_value >= beta
            {
                if !stat.noisy {
                    self.update_quiet_stats(pos, ss, stat, stat_bonus(depth));
                }
                // the previous quiet move was refuted at once
                if self.stack[ss - 1].move_count <= 2
                    && !prior_capture
                    && let Some(prev) = self.stack[ss - 1].cont_hist
                {
                    self.update_continuation_histories(ss - 1, prev.piece, prev.to, -stat_malus(depth + 1));
                }
            }
            // near the fifty-move limit the stored score may no longer hold
            if pos.rule50() < 90 {
                return tt_value;
            }
        }

        // Static evaluation.
        let raw_eval;
        let mut eval;
        if in_check {
            raw_eval = VALUE_NONE;
            eval = VALUE_NONE;
            self.stack[ss].static_eval = VALUE_NONE;
        } else if !excluded.is_none() {
            raw_eval = VALUE_NONE;
            eval = self.stack[ss].static_eval;
        } else if let Some(e) = tte {
            raw_eval = if e.eval == VALUE_NONE { evaluate(pos) } else { e.eval };
            let static_eval = self.corrected_eval(pos, raw_eval);
            self.stack[ss].static_eval = static_eval;
            eval = static_eval;
            if tt_value != VALUE_NONE && e.bound.includes(if tt_value > eval { Bound::Lower } else { Bound::Upper }) {
                eval = tt_value;
            }
        } else {
            raw_eval = evaluate(pos);
            let static_eval = self.corrected_eval(pos, raw_eval);
            self.stack[ss].static_eval = static_eval;
            eval = static_eval;
            self.shared
                .tt
                .store(pos_key, DEPTH_NONE, Bound::None, VALUE_NONE, raw_eval, PackedMove::NONE, ply, tt_pv);
        }

        let static_eval = self.stack[ss].static_eval;

        let moves = pos.legal_moves();
        let tt_move: Option<Move> = if root_node {
            Some(self.root_moves[self.pv_idx].mv().clone())
        } else {
            tte.and_then(|e| e.best_move.resolve(&moves).cloned())
        };
        let tt_capture = tt_move.as_ref().is_some_and(is_noisy);

        // a quiet previous move that let the evaluation swing gets credit or blame
        if !in_check
            && excluded.is_none()
            && !prior_capture
            && self.stack[ss - 1].cont_hist.is_some()
            && self.stack[ss - 1].static_eval != VALUE_NONE
        {
            let bonus = (-14 * (self.stack[ss - 1].static_eval + static_eval)).clamp(-1449, 1449);
            self.history.update_main(!us, self.stack[ss - 1].current_move, bonus);
        }

        let improving = if in_check {
            false
        } else if self.stack[ss - 2].static_eval != VALUE_NONE {
            static_eval > self.stack[ss - 2].static_eval
        } else {
            self.stack[ss - 4].static_eval != VALUE_NONE && static_eval > self.stack[ss - 4].static_eval
        };

        if !in_check {
            // Razoring.
            if !pv_node && eval < alpha - 474 - 324 * depth * depth {
                let value = self.qsearch::<NonPv>(pos, ss, alpha - 1, alpha, DEPTH_QS_CHECKS);
                if value < alpha {
                    return value;
                }
            }

            // Reverse futility pruning.
            if !tt_pv
                && depth < 9
                && eval - futility_margin(depth, cut_node && !tt_hit, improving) - self.stack[ss - 1].stat_score / 321
                    >= beta
                && eval >= beta
                && eval < 29_462
                && (tt_move.is_none() || tt_capture)
            {
                return if beta > VALUE_TB_LOSS_IN_MAX_PLY { (eval + beta) / 2 } else { eval };
            }

            // Null move pruning with verification at high depth.
            if !pv_node
                && self.stack[ss - 1].current_move != PackedMove::NULL
                && self.stack[ss - 1].stat_score < 17_257
                && eval >= beta
                && eval >= static_eval
                && static_eval >= beta - 24 * depth + 281
                && excluded.is_none()
                && pos.non_pawn_material(us)
                && ply >= self.nmp_min_ply
                && beta > VALUE_TB_LOSS_IN_MAX_PLY
            {
                let r = ((eval - beta) / 152).min(6) + depth / 3 + 4;
                self.stack[ss].current_move = PackedMove::NULL;
                self.stack[ss].cont_hist = None;

                if pos.do_null_move() {
                    let null_value = -self.search::<NonPv>(pos, ss + 1, -beta, -beta + 1, depth - r, !cut_node);
                    pos.undo_move();

                    if null_value >= beta && null_value < VALUE_TB_WIN_IN_MAX_PLY {
                        if self.nmp_min_ply != 0 || depth < 16 {
                            return null_value;
                        }
                        // no null moves for the first part of the remaining tree
                        self.nmp_min_ply = ply + 3 * (depth - r) / 4;
                        let value = self.search::<NonPv>(pos, ss, beta - 1, beta, depth - r, false);
                        self.nmp_min_ply = 0;
                        if value >= beta {
                            return null_value;
                        }
                    }
                }
            }
        }

        // Internal iterative reductions.
        if pv_node && tt_move.is_none() {
            depth -= 3;
        }
        if depth <= 0 {
            return self.qsearch::<Pv>(pos, ss, alpha, beta, DEPTH_QS_CHECKS);
        }
        if cut_node && depth >= 8 && tt_move.is_none() {
            depth -= 2;
        }

        let cont = self.cont_keys(ss);
        let mut picker = {
            let ctx = QuietContext {
                history: &self.history,
                cont,
                killers: self.stack[ss].killers,
                counter: self.stack[ss - 1]
                    .cont_hist
                    .map_or(PackedMove::NONE, |k| self.history.counter_move(k)),
            };
            MovePicker::new(pos, moves, PackedMove::from_option(tt_move.as_ref()), &ctx)
        };

        let mut value = best_value;
        let mut move_count = 0;
        let mut best: Option<MoveStat> = None;
        let mut quiets = Searched::new();
        let mut captures = Searched::new();

        while let Some(mv) = picker.next() {
            let stat = MoveStat::new(pos, &mv);
            if stat.packed == excluded {
                continue;
            }
            // in MultiPV mode only the root moves of the current line group
            if root_node && !self.root_moves[self.pv_idx..self.pv_last].iter().any(|rm| rm.is(&mv)) {
                continue;
            }

            move_count += 1;
            self.stack[ss].move_count = move_count;

            let capture = stat.noisy;
            let gives_check = pos.gives_check(&mv);
            let is_tt_move = tt_move.as_ref() == Some(&mv);
            let mut new_depth = depth - 1;
            let delta = beta - alpha;
            let mut r = reduction(improving, depth, move_count, delta, self.root_delta);

            // Shallow depth pruning.
            if !root_node && pos.non_pawn_material(us) && best_value > VALUE_TB_LOSS_IN_MAX_PLY {
                if move_count >= futility_move_count(improving, depth) {
                    picker.skip_quiet_moves();
                }
                let lmr_depth = new_depth - r;

                if capture || gives_check {
                    if !gives_check && !in_check && lmr_depth < 7 {
                        let futility = static_eval
                            + 277
                            + 292 * lmr_depth
                            + captured_value(&mv)
                            + self.history.capture(stat.piece, stat.to, stat.captured) / 7;
                        if futility <= alpha {
                            continue;
                        }
                    }
                    if !see_ge(pos, &mv, -203 * depth) {
                        continue;
                    }
                } else {
                    let mut history = [cont[0], cont[1], cont[3]]
                        .iter()
                        .flatten()
                        .map(|key| self.history.continuation(*key, stat.piece, stat.to))
                        .sum::<i32>()
                        + self.history.pawn(pos.pawn_key(), stat.piece, stat.to);

                    if lmr_depth < 6 && history < -4195 * depth {
                        continue;
                    }

                    history += 2 * self.history.main(us, stat.packed);
                    let lmr_depth = lmr_depth + history / 6992;

                    if !in_check
                        && lmr_depth < 15
                        && static_eval + if best_value < static_eval - 59 { 141 } else { 58 } + 125 * lmr_depth <= alpha
                    {
                        continue;
                    }

                    let lmr_depth = lmr_depth.max(0);
                    if !see_ge(pos, &mv, -26 * lmr_depth * lmr_depth) {
                        continue;
                    }
                }
            }

            // Extensions.
            let mut extension = 0;
            if ply < self.root_depth * 2 {
                if !root_node
                    && is_tt_move
                    && excluded.is_none()
                    && depth >= 4 - i32::from(self.completed_depth > 24) + 2 * i32::from(pv_node && tt_pv)
                    && let Some(e) = tte
                    && tt_value.abs() < VALUE_TB_WIN_IN_MAX_PLY
                    && e.bound.includes(Bound::Lower)
                    && e.depth >= depth - 3
                {
                    // Is the TT move the only good move here?
                    let singular_beta = tt_value - (64 + 57 * i32::from(tt_pv && !pv_node)) * depth / 64;
                    let singular_depth = new_depth / 2;

                    self.stack[ss].excluded_move = stat.packed;
                    let value = self.search::<NonPv>(pos, ss, singular_beta - 1, singular_beta, singular_depth, cut_node);
                    self.stack[ss].excluded_move = PackedMove::NONE;
                    self.stack[ss].move_count = move_count;

                    if value < singular_beta {
                        extension = 1;
                        if !pv_node && value < singular_beta - 18 && self.stack[ss].double_extensions <= 11 {
                            extension = 2;
                            depth += i32::from(depth < 15);
                        }
                    } else if singular_beta >= beta {
                        // several moves beat beta: multi-cut
                        return singular_beta;
                    } else if tt_value >= beta {
                        extension = -2 - i32::from(!pv_node);
                    } else if cut_node {
                        extension = if depth < 19 { -2 } else { -1 };
                    } else if tt_value <= value {
                        extension = -1;
                    }
                } else if gives_check && depth > 9 {
                    extension = 1;
                }
            }
            new_depth += extension;
            self.stack[ss].double_extensions = self.stack[ss - 1].double_extensions + i32::from(extension == 2);

            self.stack[ss].current_move = stat.packed;
            self.stack[ss].cont_hist = Some(ContHistKey {
                in_check,
                capture: mv.is_capture(),
                piece: stat.piece,
                to: stat.to,
            });
            pos.do_move(&mv);

            // Reduction adjustments.
            if tt_pv {
                r -= 1
                    + i32::from(tte.is_some_and(|e| e.value > alpha))
                    + i32::from(tte.is_some_and(|e| e.depth >= depth));
            }
            if cut_node {
                r += 2 - i32::from(tt_pv && tte.is_some_and(|e| e.depth >= depth));
            }
            if tt_capture {
                r += 1;
            }
            if pv_node {
                r -= 1;
            }
            if self.stack[ss + 1].cutoff_cnt > 3 {
                r += 1;
            } else if is_tt_move {
                r = 0;
            }

            let cont_sum: i32 = [cont[0], cont[1], cont[3]]
                .iter()
                .flatten()
                .map(|key| self.history.continuation(*key, stat.piece, stat.to))
                .sum();
            self.stack[ss].stat_score = 2 * self.history.main(us, stat.packed) + cont_sum - 3848;
            r -= self.stack[ss].stat_score / 14_200;

            // Late move reduction, then full-depth zero-window, then PV search.
            if depth >= 2 && move_count > 1 + i32::from(root_node) {
                let d = (new_depth - r).min(new_depth + 1).max(1);
                value = -self.search::<NonPv>(pos, ss + 1, -(alpha + 1), -alpha, d, true);

                if value > alpha && d < new_depth {
                    let do_deeper = value > best_value + 51 + 10 * new_depth;
                    let do_shallower = value < best_value + new_depth;
                    new_depth += i32::from(do_deeper) - i32::from(do_shallower);

                    if new_depth > d {
                        value = -self.search::<NonPv>(pos, ss + 1, -(alpha + 1), -alpha, new_depth, !cut_node);
                    }

                    let bonus = if value <= alpha {
                        -stat_malus(new_depth)
                    } else if value >= beta {
                        stat_bonus(new_depth)
                    } else {
                        0
                    };
                    self.update_continuation_histories(ss, stat.piece, stat.to, bonus);
                }
            } else if !pv_node || move_count > 1 {
                if tt_move.is_none() {
                    r += 2;
                }
                value = -self.search::<NonPv>(pos, ss + 1, -(alpha + 1), -alpha, new_depth - i32::from(r > 3), !cut_node);
            }

            if pv_node && (move_count == 1 || value > alpha) {
                value = -self.search::<Pv>(pos, ss + 1, -beta, -alpha, new_depth, false);
            }

            pos.undo_move();

            // the value of an interrupted search is meaningless
            if self.shared.control.is_stopped() {
                return VALUE_ZERO;
            }

            if root_node {
                let sel_depth = self.sel_depth;
                let mut changed = false;
                if let Some(rm) = self.root_moves.iter_mut().find(|rm| rm.is(&mv)) {
                    rm.average_score = if rm.average_score == -VALUE_INFINITE {
                        value
                    } else {
                        (2 * value + rm.average_score) / 3
                    };

                    if move_count == 1 || value > alpha {
                        rm.score = value;
                        rm.uci_score = value;
                        rm.sel_depth = sel_depth;
                        rm.score_lowerbound = false;
                        rm.score_upperbound = false;
                        if value >= beta {
                            rm.score_lowerbound = true;
                            rm.uci_score = beta;
                        } else if value <= alpha {
                            rm.score_upperbound = true;
                            rm.uci_score = alpha;
                        }
                        rm.pv.truncate(1);
                        rm.pv.extend_from_slice(self.pv.line(ply + 1));
                        changed = move_count > 1;
                    } else {
                        // all other moves only have an upper bound; keep them
                        // behind the best move when sorting
                        rm.score = -VALUE_INFINITE;
                    }
                }
                if changed && self.pv_idx == 0 {
                    self.counters().add_best_move_change();
                }
            }

            if value > best_value {
                best_value = value;

                if value > alpha {
                    best = Some(stat);
                    if pv_node {
                        self.pv.update(ply, &mv);
                    }

                    if value >= beta {
                        self.stack[ss].cutoff_cnt += 1 + i32::from(tt_move.is_none());
                        break;
                    }

                    // a raised alpha makes the remaining moves cheaper to refute
                    if depth > 2 && depth < 12 && beta < 13_828 && value > -11_369 {
                        depth -= 2;
                    }
                    alpha = value;
                }
            }

            if best.is_none_or(|b| b.packed != stat.packed) && move_count <= MAX_SEARCHED as i32 {
                if capture {
                    captures.push(stat);
                } else {
                    quiets.push(stat);
                }
            }
        }

        if move_count == 0 {
            best_value = if !excluded.is_none() {
                alpha
            } else if in_check {
                mated_in(ply)
            } else {
                VALUE_DRAW
            };
        } else if let Some(best) = best {
            self.update_all_stats(pos, ss, best, best_value, beta, quiets.as_slice(), captures.as_slice(), depth);
        } else if !prior_capture && let Some(prev) = self.stack[ss - 1].cont_hist {
            // the previous quiet move left us without a good reply
            let weight = i32::from(depth > 5)
                + i32::from(pv_node || cut_node)
                + i32::from(best_value < alpha - 800)
                + i32::from(self.stack[ss - 1].move_count > 12);
            self.update_continuation_histories(ss - 1, prev.piece, prev.to, stat_bonus(depth) * weight);
        }

        if best_value <= alpha {
            self.stack[ss].tt_pv = self.stack[ss].tt_pv || (self.stack[ss - 1].tt_pv && depth > 3);
        }

        if excluded.is_none() && !(root_node && self.pv_idx > 0) {
            let bound = if best_value >= beta {
                Bound::Lower
            } else if pv_node && best.is_some() {
                Bound::Exact
            } else {
                Bound::Upper
            };
            self.shared.tt.store(
                pos_key,
                depth,
                bound,
                best_value,
                raw_eval,
                best.map_or(PackedMove::NONE, |b| b.packed),
                ply,
                self.stack[ss].tt_pv,
            );
        }

        // learn how far the static evaluation was off for this pawn structure
        if !in_check
            && excluded.is_none()
            && best.is_none_or(|b| !b.noisy)
            && !(best_value >= beta && best_value <= static_eval)
            && !(best.is_none() && best_value >= static_eval)
        {
            let limit = CORRECTION_HISTORY_LIMIT / 4;
            let bonus = ((best_value - static_eval) * depth / 8).clamp(-limit, limit);
            self.history.update_correction(us, pos.pawn_key(), bonus);
        }

        debug_assert!(-VALUE_INFINITE < best_value && best_value < VALUE_INFINITE);
        best_value
    }

    /// Quiescence search: resolve captures (and, at the first level, quiet
    /// checks) until the position is quiet enough to trust its evaluation.
    pub(crate) fn qsearch<NT: NodeType>(
        &mut self,
        pos: &mut Position,
        ss: usize,
        mut alpha: Value,
        beta: Value,
        depth: Depth,
    ) -> Value {
        let pv_node = NT::PV;
        debug_assert!(!NT::ROOT);
        debug_assert!(pv_node || alpha == beta - 1);

        let ply = self.stack[ss].ply;
        let in_check = pos.in_check();
        self.stack[ss].in_check = in_check;

        if pv_node {
            self.pv.clear(ply);
            self.sel_depth = self.sel_depth.max(ply + 1);
        }

        self.counters().add_node();
        if self.is_main() {
            self.check_time();
        }

        if self.shared.control.is_stopped() {
            return VALUE_ZERO;
        }
        if pos.is_draw(ply as usize) || ply >= MAX_PLY {
            return if ply >= MAX_PLY && !in_check { self.static_value(pos) } else { self.value_draw(ply) };
        }

        // entries that searched quiet checks also answer captures-only probes
        let tt_depth = if in_check || depth >= DEPTH_QS_CHECKS { DEPTH_QS_CHECKS } else { DEPTH_QS_NO_CHECKS };
        let pos_key = pos.key();
        let tte = self.shared.tt.probe(pos_key, ply);
        let tt_value = tte.map_or(VALUE_NONE, |e| e.value);
        let pv_hit = tte.is_some_and(|e| e.is_pv);

        if !pv_node
            && let Some(e) = tte
            && e.depth >= tt_depth
            && tt_value != VALUE_NONE
            && e.bound.includes(if tt_value >= beta { Bound::Lower } else { Bound::Upper })
        {
            return tt_value;
        }

        let moves = pos.legal_moves();
        let tt_move = tte.map_or(PackedMove::NONE, |e| {
            PackedMove::from_option(e.best_move.resolve(&moves))
        });

        // Stand pat.
        let raw_eval;
        let mut best_value;
        let futility_base;
        if in_check {
            raw_eval = VALUE_NONE;
            best_value = -VALUE_INFINITE;
            futility_base = -VALUE_INFINITE;
            self.stack[ss].static_eval = VALUE_NONE;
        } else {
            let static_eval;
            if let Some(e) = tte {
                raw_eval = if e.eval == VALUE_NONE { evaluate(pos) } else { e.eval };
                static_eval = self.corrected_eval(pos, raw_eval);
                best_value = static_eval;
                if tt_value != VALUE_NONE
                    && e.bound.includes(if tt_value > best_value { Bound::Lower } else { Bound::Upper })
                {
                    best_value = tt_value;
                }
            } else {
                raw_eval = evaluate(pos);
                static_eval = self.corrected_eval(pos, raw_eval);
                best_value = static_eval;
            }
            self.stack[ss].static_eval = static_eval;

            if best_value >= beta {
                if best_value.abs() < VALUE_TB_WIN_IN_MAX_PLY && !pv_node {
                    best_value = (3 * best_value + beta) / 4;
                }
                if tte.is_none() {
                    self.shared
                        .tt
                        .store(pos_key, DEPTH_NONE, Bound::Lower, best_value, raw_eval, PackedMove::NONE, ply, false);
                }
                return best_value;
            }
            alpha = alpha.max(best_value);
            futility_base = static_eval + 206;
        }

        let cont = self.cont_keys(ss);
        let prev_to = self.stack[ss - 1].cont_hist.map(|k| k.to);
        let mut picker = {
            let ctx = QuietContext {
                history: &self.history,
                cont,
                killers: [PackedMove::NONE; 2],
                counter: PackedMove::NONE,
            };
            MovePicker::new_qsearch(pos, moves, tt_move, depth >= DEPTH_QS_CHECKS, &ctx)
        };

        let mut best_move = PackedMove::NONE;
        let mut move_count = 0;
        let mut quiet_check_evasions = 0;

        while let Some(mv) = picker.next() {
            let stat = MoveStat::new(pos, &mv);
            let gives_check = pos.gives_check(&mv);
            let capture = stat.noisy;
            move_count += 1;

            if best_value > VALUE_TB_LOSS_IN_MAX_PLY {
                // Futility and SEE pruning for captures that cannot raise alpha.
                if !gives_check
                    && prev_to != Some(stat.to)
                    && futility_base > VALUE_TB_LOSS_IN_MAX_PLY
                    && mv.promotion().is_none()
                {
                    if move_count > 2 {
                        continue;
                    }
                    let futility_value = futility_base + captured_value(&mv);
                    if futility_value <= alpha {
                        best_value = best_value.max(futility_value);
                        continue;
                    }
                    if futility_base <= alpha && !see_ge(pos, &mv, 1) {
                        best_value = best_value.max(futility_base);
                        continue;
                    }
                }

                if quiet_check_evasions > 1 {
                    break;
                }

                if !capture
                    && [cont[0], cont[1]]
                        .iter()
                        .all(|key| key.is_some_and(|k| self.history.continuation(k, stat.piece, stat.to) < 0))
                {
                    continue;
                }

                if !see_ge(pos, &mv, -76) {
                    continue;
                }
            }

            self.stack[ss].current_move = stat.packed;
            self.stack[ss].cont_hist = Some(ContHistKey {
                in_check,
                capture: mv.is_capture(),
                piece: stat.piece,
                to: stat.to,
            });
            quiet_check_evasions += i32::from(!capture && in_check);

            pos.do_move(&mv);
            let value = -self.qsearch::<NT>(pos, ss + 1, -beta, -alpha, depth - 1);
            pos.undo_move();

            if self.shared.control.is_stopped() {
                return VALUE_ZERO;
            }

            if value > best_value {
                best_value = value;
                if value > alpha {
                    best_move = stat.packed;
                    if pv_node {
                        self.pv.update(ply, &mv);
                    }
                    if value < beta {
                        alpha = value;
                    } else {
                        break;
                    }
                }
            }
        }

        // every evasion was searched (none is pruned before one was) and none exists
        if in_check && best_value == -VALUE_INFINITE {
            return mated_in(ply);
        }

        if best_value.abs() < VALUE_TB_WIN_IN_MAX_PLY && best_value >= beta {
            best_value = (3 * best_value + beta) / 4;
        }

        let bound = if best_value >= beta { Bound::Lower } else { Bound::Upper };
        self.shared
            .tt
            .store(pos_key, tt_depth, bound, best_value, raw_eval, best_move, ply, pv_hit);

        debug_assert!(-VALUE_INFINITE < best_value && best_value < VALUE_INFINITE);
        best_value
    }

    /// Evaluation used where the search cannot go deeper.
    fn static_value(&self, pos: &Position) -> Value {
        self.corrected_eval(pos, evaluate(pos))
    }

    /// Continuation keys of the moves 1, 2, 3, 4 and 6 plies before `ss`.
    fn cont_keys(&self, ss: usize) -> ContKeys {
        [1, 2, 3, 4, 6].map(|back| self.stack[ss - back].cont_hist)
    }

    /// Feed `bonus` for `piece` to `to` at `ss` into the continuation tables
    /// of the preceding moves. In check only the two closest are updated.
    fn update_continuation_histories(&mut self, ss: usize, piece: usize, to: usize, bonus: i32) {
        let in_check = self.stack[ss].in_check;
        for back in [1, 2, 3, 4, 6] {
            if in_check && back > 2 {
                break;
            }
            if let Some(key) = self.stack[ss - back].cont_hist {
                self.history.update_continuation(key, piece, to, bonus);
            }
        }
    }

    fn update_quiet_stats(&mut self, pos: &Position, ss: usize, stat: MoveStat, bonus: i32) {
        let entry = &mut self.stack[ss];
        if entry.killers[0] != stat.packed {
            entry.killers[1] = entry.killers[0];
            entry.killers[0] = stat.packed;
        }

        self.history.update_main(pos.side_to_move(), stat.packed, bonus);
        self.update_continuation_histories(ss, stat.piece, stat.to, bonus);
        if let Some(prev) = self.stack[ss - 1].cont_hist {
            self.history.set_counter_move(prev, stat.packed);
        }
        self.history.update_pawn(pos.pawn_key(), stat.piece, stat.to, bonus / 2);
    }

    /// Reward the move that was best at this node and punish the ones
    /// searched before it.
    #[allow(clippy::too_many_arguments)]
    fn update_all_stats(
        &mut self,
        pos: &Position,
        ss: usize,
        best: MoveStat,
        best_value: Value,
        beta: Value,
        quiets: &[MoveStat],
        captures: &[MoveStat],
        depth: Depth,
    ) {
        let us = pos.side_to_move();
        let bonus = stat_bonus(depth + 1);
        let malus = stat_malus(depth);

        if best.noisy {
            self.history.update_capture(best.piece, best.to, best.captured, bonus);
        } else {
            let quiet_bonus = if best_value > beta + 173 { bonus } else { stat_bonus(depth) };
            self.update_quiet_stats(pos, ss, best, quiet_bonus);
            for quiet in quiets {
                self.history.update_main(us, quiet.packed, -malus);
                self.update_continuation_histories(ss, quiet.piece, quiet.to, -malus);
                self.history.update_pawn(pos.pawn_key(), quiet.piece, quiet.to, -malus / 2);
            }
        }

        // the previous quiet move was refuted early
        if let Some(prev) = self.stack[ss - 1].cont_hist
            && !prev.capture
            && (self.stack[ss - 1].move_count == 1 + i32::from(self.stack[ss - 1].tt_hit)
                || self.stack[ss - 1].current_move == self.stack[ss - 1].killers[0])
        {
            self.update_continuation_histories(ss - 1, prev.piece, prev.to, -malus);
        }

        for capture in captures {
            self.history.update_capture(capture.piece, capture.to, capture.captured, -malus);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::options::EngineOptions;
    use crate::search::ExternalShared;
    use crate::search::control::{SearchControl, ThreadCounters};
    use crate::search::report::NoopListener;
    use crate::search::stack::STACK_OFFSET;
    use crate::search::tt::TranspositionTable;

    const MIDDLEGAME_FEN: &str = "r1bq1rk1/ppp2ppp/2np1n2/2b1p3/2B1P3/2NP1N2/PPP2PPP/R1BQ1RK1 w - - 0 7";

    fn worker(options: EngineOptions) -> Worker {
        let shared = ExternalShared {
            options: Arc::new(options),
            tt: Arc::new(TranspositionTable::new(1)),
            control: Arc::new(SearchControl::new(false)),
            counters: (0..1).map(|_| ThreadCounters::default()).collect(),
            listener: Arc::new(NoopListener),
        };
        Worker::new(0, shared, None)
    }

    #[test]
    fn tt_cutoff_returns_before_searching_moves() {
        let mut w = worker(EngineOptions::default());
        let mut pos = Position::from_fen(MIDDLEGAME_FEN).unwrap();
        let ss = STACK_OFFSET + 1;
        let ply = w.stack[ss].ply;
        let quiet = PackedMove::new(&pos.parse_uci("h2h3").unwrap());
        w.shared.tt.store(pos.key(), 20, Bound::Lower, 500, 0, quiet, ply, false);

        let value = w.search::<NonPv>(&mut pos, ss, 99, 100, 3, false);
        assert_eq!(value, 500);
        assert_eq!(w.counters().nodes(), 1, "no child may be searched");
        // the quiet TT move is rewarded without being generated or played
        assert!(w.history.main(pos.side_to_move(), quiet) > 0);
        assert_eq!(w.stack[ss].killers[0], quiet);
    }

    #[test]
    fn tt_move_stats_are_read_off_the_board() {
        let pos = Position::from_fen("4k3/8/8/3p4/4P3/8/8/4K2R w K - 0 1").unwrap();
        let capture = pos.parse_uci("e4d5").unwrap();
        let stat = MoveStat::from_packed(&pos, PackedMove::new(&capture)).unwrap();
        assert!(stat.noisy);
        assert_eq!(stat.captured, role_index(Role::Pawn));
        assert_eq!(stat.to, capture.to() as usize);

        let castle = pos.parse_uci("e1g1").unwrap();
        let stat = MoveStat::from_packed(&pos, PackedMove::new(&castle)).unwrap();
        assert!(!stat.noisy, "castling onto the own rook is quiet");

        // a hint from the other side's point of view is rejected
        let black = PackedMove::new(&Position::from_fen("4k3/8/8/3p4/4P3/8/8/4K2R b K - 0 1")
            .unwrap()
            .parse_uci("d5d4")
            .unwrap());
        assert!(MoveStat::from_packed(&pos, black).is_none());
    }

    #[test]
    fn qsearch_draws_include_contempt() {
        let mut w = worker(EngineOptions {
            contempt: 50,
            ..EngineOptions::default()
        });
        let mut pos = Position::from_fen("8/8/4k3/8/8/3K4/8/8 w - - 0 1").unwrap();
        // even ply: the root side to move dislikes the draw
        let value = w.qsearch::<NonPv>(&mut pos, STACK_OFFSET + 2, -1, 0, DEPTH_QS_CHECKS);
        assert!((value + 50).abs() <= 1, "draw scored {value}");
    }

    #[test]
    fn bonus_and_malus_grow_then_saturate() {
        assert!(stat_bonus(2) < stat_bonus(3));
        assert_eq!(stat_bonus(20), 1153);
        assert_eq!(stat_malus(20), 1201);
        // depth one results are too shallow to reward
        assert!(stat_bonus(1) < 0);
    }

    #[test]
    fn futility_margin_shrinks_when_improving() {
        assert!(futility_margin(4, false, true) < futility_margin(4, false, false));
        assert!(futility_margin(4, true, false) < futility_margin(4, false, false));
    }

    #[test]
    fn move_count_pruning_is_looser_when_improving() {
        assert!(futility_move_count(true, 5) > futility_move_count(false, 5));
    }

    #[test]
    fn searched_list_is_capped() {
        let mut searched = Searched::new();
        for _ in 0..MAX_SEARCHED + 5 {
            searched.push(MoveStat::EMPTY);
        }
        assert_eq!(searched.as_slice().len(), MAX_SEARCHED);
    }
}
