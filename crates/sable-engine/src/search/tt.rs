//! Lockless transposition table shared by all search threads.
//!
//! Each slot is two `AtomicU64` words (16 bytes).
//!
//! ```text
//! word0:
//!   bits 63-32: key           (upper 32 bits of the Zobrist key)
//!   bits 31-27: generation    (5 bits, wraps at 32)
//!   bit  26:    is_pv
//!   bits 25-24: bound         (Bound bitmask)
//!   bits 23-16: depth         (depth - DEPTH_OFFSET; 0 marks an empty slot)
//!   bits 15-0:  move          (PackedMove)
//!
//! word1:
//!   bits 63-32: check         = key XOR (word0 & 0xFFFF_FFFF)
//!   bits 31-16: value         (i16)
//!   bits 15-0:  eval          (i16)
//! ```
//!
//! Writers store both words with `Relaxed` ordering and never lock. A reader
//! that sees one word from one write and one from another fails the XOR
//! check and treats the slot as a miss, so races cost a probe, never a
//! corrupt entry.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use sable_core::PackedMove;

use super::{DEPTH_OFFSET, Depth, VALUE_NONE, VALUE_TB_LOSS_IN_MAX_PLY, VALUE_TB_WIN_IN_MAX_PLY, Value};

const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check() {
        assert_send_sync::<TranspositionTable>();
    }
    let _ = check;
};

/// Kind of bound a stored value represents. `Exact` has both bits set, so
/// [`Bound::includes`] answers "is this at least a lower/upper bound".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Bound {
    /// Evaluation-only entry; the value carries no information.
    None = 0,
    /// The true value is at most the stored one (fail low).
    Upper = 1,
    /// The true value is at least the stored one (fail high).
    Lower = 2,
    /// The stored value is exact.
    Exact = 3,
}

impl Bound {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            1 => Bound::Upper,
            2 => Bound::Lower,
            3 => Bound::Exact,
            _ => Bound::None,
        }
    }

    /// Whether this bound carries the information of `other`.
    #[inline]
    pub const fn includes(self, other: Bound) -> bool {
        (self as u8) & (other as u8) != 0
    }
}

/// Decoded entry.
#[derive(Debug, Clone, Copy)]
pub struct TtProbeResult {
    /// Move hint; resolve against the legal moves before use.
    pub best_move: PackedMove,
    pub depth: Depth,
    pub bound: Bound,
    /// Root-relative value, or [`VALUE_NONE`].
    pub value: Value,
    /// Unadjusted static evaluation, or [`VALUE_NONE`].
    pub eval: Value,
    pub is_pv: bool,
}

/// Make a mate or tablebase score relative to the node instead of the root,
/// so the same entry is valid on every path reaching it.
pub fn value_to_tt(v: Value, ply: i32) -> Value {
    if v == VALUE_NONE {
        v
    } else if v >= VALUE_TB_WIN_IN_MAX_PLY {
        v + ply
    } else if v <= VALUE_TB_LOSS_IN_MAX_PLY {
        v - ply
    } else {
        v
    }
}

/// Inverse of [`value_to_tt`].
pub fn value_from_tt(v: Value, ply: i32) -> Value {
    if v == VALUE_NONE {
        v
    } else if v >= VALUE_TB_WIN_IN_MAX_PLY {
        v - ply
    } else if v <= VALUE_TB_LOSS_IN_MAX_PLY {
        v + ply
    } else {
        v
    }
}

struct AtomicEntry {
    word0: AtomicU64,
    word1: AtomicU64,
}

/// Unpacked `word0`.
struct Header {
    key32: u32,
    generation: u8,
    is_pv: bool,
    bound: Bound,
    depth8: u8,
    mv: PackedMove,
}

impl Header {
    fn decode(w0: u64) -> Header {
        Header {
            key32: (w0 >> 32) as u32,
            generation: ((w0 >> 27) & 0x1F) as u8,
            is_pv: (w0 >> 26) & 1 != 0,
            bound: Bound::from_bits(((w0 >> 24) & 0x03) as u8),
            depth8: ((w0 >> 16) & 0xFF) as u8,
            mv: PackedMove::from_raw((w0 & 0xFFFF) as u16),
        }
    }

    fn encode(&self) -> u64 {
        (u64::from(self.key32) << 32)
            | (u64::from(self.generation & 0x1F) << 27)
            | (u64::from(self.is_pv) << 26)
            | (u64::from(self.bound as u8) << 24)
            | (u64::from(self.depth8) << 16)
            | u64::from(self.mv.raw())
    }
}

impl AtomicEntry {
    const fn new() -> Self {
        Self {
            word0: AtomicU64::new(0),
            word1: AtomicU64::new(0),
        }
    }

    fn pack_word1(w0: u64, value: i16, eval: i16) -> u64 {
        let check = ((w0 >> 32) as u32) ^ (w0 as u32);
        (u64::from(check) << 32) | (u64::from(value as u16) << 16) | u64::from(eval as u16)
    }

    /// Both words, if they belong to the same write and to `key`.
    fn load(&self, key: u64) -> Option<(Header, u64)> {
        let w0 = self.word0.load(Ordering::Relaxed);
        let w1 = self.word1.load(Ordering::Relaxed);
        if ((w0 >> 32) as u32) ^ (w0 as u32) != (w1 >> 32) as u32 {
            return None;
        }
        let header = Header::decode(w0);
        if header.key32 != (key >> 32) as u32 || header.depth8 == 0 {
            return None;
        }
        Some((header, w1))
    }

    fn store(&self, w0: u64, w1: u64) {
        self.word0.store(w0, Ordering::Relaxed);
        self.word1.store(w1, Ordering::Relaxed);
    }
}

/// Shared, lock-free transposition table. All methods take `&self`.
pub struct TranspositionTable {
    entries: Box<[AtomicEntry]>,
    mask: u64,
    generation: AtomicU8,
}

impl TranspositionTable {
    /// Allocate a table of about `mb` megabytes, rounded down to a power of
    /// two number of slots.
    pub fn new(mb: usize) -> Self {
        let bytes = mb.max(1) * 1024 * 1024;
        let slots = (bytes / std::mem::size_of::<AtomicEntry>()).next_power_of_two() >> 1;
        let slots = slots.max(1);
        let entries: Box<[AtomicEntry]> = (0..slots).map(|_| AtomicEntry::new()).collect();
        tracing::debug!(mb, slots, "allocated transposition table");
        Self {
            entries,
            mask: (slots - 1) as u64,
            generation: AtomicU8::new(0),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Wipe every entry and reset the generation.
    pub fn clear(&self) {
        for entry in self.entries.iter() {
            entry.store(0, 0);
        }
        self.generation.store(0, Ordering::Relaxed);
    }

    /// Start a new search generation. Older entries become preferred
    /// replacement victims.
    pub fn new_search(&self) {
        let current = self.generation.load(Ordering::Relaxed);
        self.generation.store(current.wrapping_add(1) & 0x1F, Ordering::Relaxed);
    }

    pub fn generation(&self) -> u8 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Look up `key`. `ply` converts stored mate distances back to the root.
    pub fn probe(&self, key: u64, ply: i32) -> Option<TtProbeResult> {
        let (header, w1) = self.entries[(key & self.mask) as usize].load(key)?;
        let value = i32::from((w1 >> 16) as u16 as i16);
        let eval = i32::from(w1 as u16 as i16);
        Some(TtProbeResult {
            best_move: header.mv,
            depth: i32::from(header.depth8) + DEPTH_OFFSET,
            bound: header.bound,
            value: value_from_tt(value, ply),
            eval,
            is_pv: header.is_pv,
        })
    }

    /// Save a search result.
    ///
    /// A slot is overwritten when it is empty, holds another position, is
    /// from an older generation, is not much deeper than the new result, or
    /// when the new bound is exact. A result without a move keeps the move
    /// already stored for the same position.
    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &self,
        key: u64,
        depth: Depth,
        bound: Bound,
        value: Value,
        eval: Value,
        mv: PackedMove,
        ply: i32,
        is_pv: bool,
    ) {
        let entry = &self.entries[(key & self.mask) as usize];
        let generation = self.generation();
        let key32 = (key >> 32) as u32;
        let depth8 = (depth - DEPTH_OFFSET).clamp(1, 255) as u8;

        let existing = Header::decode(entry.word0.load(Ordering::Relaxed));
        let same_position = existing.key32 == key32 && existing.depth8 != 0;
        let mv = if mv.is_none() && same_position { existing.mv } else { mv };

        let replace = !same_position
            || existing.generation != generation
            || bound == Bound::Exact
            || i32::from(depth8) + 2 * i32::from(is_pv) > i32::from(existing.depth8) - 4;
        if !replace {
            return;
        }

        let w0 = Header {
            key32,
            generation,
            is_pv,
            bound,
            depth8,
            mv,
        }
        .encode();
        let w1 = AtomicEntry::pack_word1(w0, value_to_tt(value, ply) as i16, eval as i16);
        entry.store(w0, w1);
    }

    /// Permille of the first thousand slots written during this generation.
    pub fn hashfull(&self) -> usize {
        let generation = self.generation();
        let sample = self.entries.len().min(1000);
        if sample == 0 {
            return 0;
        }
        let used = self.entries[..sample]
            .iter()
            .filter(|e| {
                let h = Header::decode(e.word0.load(Ordering::Relaxed));
                h.depth8 != 0 && h.generation == generation
            })
            .count();
        used * 1000 / sample
    }
}

impl std::fmt::Debug for TranspositionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranspositionTable")
            .field("slots", &self.entries.len())
            .field("generation", &self.generation())
            .finish()
    }
}
