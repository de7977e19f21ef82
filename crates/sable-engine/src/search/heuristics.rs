//! Move-ordering and evaluation-correction statistics, one set per thread.
//!
//! Every table uses the same "gravity" update: an entry moves towards
//! `bonus` and is pulled back in proportion to its own size, so values stay
//! within `±limit` without explicit clamping of the entry.

use sable_core::{Color, PackedMove, color_index};

/// Butterfly (from-to) history bound.
pub const MAIN_HISTORY_LIMIT: i32 = 7_183;
/// Capture history bound.
pub const CAPTURE_HISTORY_LIMIT: i32 = 10_692;
/// Continuation history bound.
pub const CONTINUATION_HISTORY_LIMIT: i32 = 29_952;
/// Pawn-structure history bound.
pub const PAWN_HISTORY_LIMIT: i32 = 8_192;
/// Correction history bound.
pub const CORRECTION_HISTORY_LIMIT: i32 = 1_024;

pub const PAWN_HISTORY_SIZE: usize = 512;
pub const CORRECTION_HISTORY_SIZE: usize = 16_384;

const PIECE_SQUARES: usize = 12 * 64;

/// Selects the continuation table a move feeds: whether the side moving was
/// in check, whether the move captured, and the moved piece and its
/// destination. Stack entries keep one so that later plies can look up
/// "what followed this move".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContHistKey {
    pub in_check: bool,
    pub capture: bool,
    /// Piece index in `0..12`.
    pub piece: usize,
    /// Destination square index.
    pub to: usize,
}

impl ContHistKey {
    fn table(self) -> usize {
        ((usize::from(self.in_check) * 2 + usize::from(self.capture)) * PIECE_SQUARES + self.piece * 64 + self.to)
            * PIECE_SQUARES
    }
}

#[inline]
fn gravity(entry: &mut i16, bonus: i32, limit: i32) {
    let bonus = bonus.clamp(-limit, limit);
    let current = i32::from(*entry);
    *entry = (current + bonus - current * bonus.abs() / limit) as i16;
}

/// All history tables of one worker. Heap allocated; the continuation
/// tables alone are several megabytes.
pub struct Histories {
    main: Box<[i16]>,
    counter_moves: Box<[PackedMove]>,
    capture: Box<[i16]>,
    continuation: Box<[i16]>,
    pawn: Box<[i16]>,
    correction: Box<[i16]>,
}

impl Histories {
    pub fn new() -> Self {
        Self {
            main: vec![0; 2 * 4096].into_boxed_slice(),
            counter_moves: vec![PackedMove::NONE; PIECE_SQUARES].into_boxed_slice(),
            capture: vec![0; PIECE_SQUARES * 6].into_boxed_slice(),
            continuation: vec![0; 4 * PIECE_SQUARES * PIECE_SQUARES].into_boxed_slice(),
            pawn: vec![0; PAWN_HISTORY_SIZE * PIECE_SQUARES].into_boxed_slice(),
            correction: vec![0; 2 * CORRECTION_HISTORY_SIZE].into_boxed_slice(),
        }
    }

    /// Forget everything (new game).
    pub fn clear(&mut self) {
        self.main.fill(0);
        self.counter_moves.fill(PackedMove::NONE);
        self.capture.fill(0);
        self.continuation.fill(0);
        self.pawn.fill(0);
        self.correction.fill(0);
    }

    #[inline]
    pub fn main(&self, us: Color, mv: PackedMove) -> i32 {
        i32::from(self.main[color_index(us) * 4096 + mv.from_to()])
    }

    pub fn update_main(&mut self, us: Color, mv: PackedMove, bonus: i32) {
        gravity(&mut self.main[color_index(us) * 4096 + mv.from_to()], bonus, MAIN_HISTORY_LIMIT);
    }

    /// The quiet reply that last refuted the move described by `prev`.
    #[inline]
    pub fn counter_move(&self, prev: ContHistKey) -> PackedMove {
        self.counter_moves[prev.piece * 64 + prev.to]
    }

    pub fn set_counter_move(&mut self, prev: ContHistKey, mv: PackedMove) {
        self.counter_moves[prev.piece * 64 + prev.to] = mv;
    }

    /// `captured` is a role index in `0..6`.
    #[inline]
    pub fn capture(&self, piece: usize, to: usize, captured: usize) -> i32 {
        i32::from(self.capture[(piece * 64 + to) * 6 + captured])
    }

    pub fn update_capture(&mut self, piece: usize, to: usize, captured: usize, bonus: i32) {
        gravity(&mut self.capture[(piece * 64 + to) * 6 + captured], bonus, CAPTURE_HISTORY_LIMIT);
    }

    /// How well `piece` to `to` did after the move described by `key`.
    #[inline]
    pub fn continuation(&self, key: ContHistKey, piece: usize, to: usize) -> i32 {
        i32::from(self.continuation[key.table() + piece * 64 + to])
    }

    pub fn update_continuation(&mut self, key: ContHistKey, piece: usize, to: usize, bonus: i32) {
        gravity(
            &mut self.continuation[key.table() + piece * 64 + to],
            bonus,
            CONTINUATION_HISTORY_LIMIT,
        );
    }

    #[inline]
    pub fn pawn(&self, pawn_key: u64, piece: usize, to: usize) -> i32 {
        i32::from(self.pawn[pawn_index(pawn_key) * PIECE_SQUARES + piece * 64 + to])
    }

    pub fn update_pawn(&mut self, pawn_key: u64, piece: usize, to: usize, bonus: i32) {
        gravity(
            &mut self.pawn[pawn_index(pawn_key) * PIECE_SQUARES + piece * 64 + to],
            bonus,
            PAWN_HISTORY_LIMIT,
        );
    }

    /// Learned static-evaluation error for this pawn structure.
    #[inline]
    pub fn correction(&self, us: Color, pawn_key: u64) -> i32 {
        i32::from(self.correction[correction_index(us, pawn_key)])
    }

    pub fn update_correction(&mut self, us: Color, pawn_key: u64, bonus: i32) {
        gravity(
            &mut self.correction[correction_index(us, pawn_key)],
            bonus,
            CORRECTION_HISTORY_LIMIT,
        );
    }
}

impl Default for Histories {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn pawn_index(pawn_key: u64) -> usize {
    (pawn_key as usize) & (PAWN_HISTORY_SIZE - 1)
}

#[inline]
fn correction_index(us: Color, pawn_key: u64) -> usize {
    color_index(us) * CORRECTION_HISTORY_SIZE + ((pawn_key as usize) & (CORRECTION_HISTORY_SIZE - 1))
}
