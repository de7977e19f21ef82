//! Position collaborator for sable: legal move generation, make/unmake,
//! draw detection and hashing on top of `shakmaty`.

mod error;
mod packed;
mod position;

pub use error::PositionError;
pub use packed::PackedMove;
pub use position::{Position, STARTING_FEN};

pub use shakmaty::{Bitboard, Board, Color, Move, MoveList, Piece, Role, Square, attacks};

/// Index of a [`Role`] in `0..6` (pawn first).
#[inline]
pub fn role_index(role: Role) -> usize {
    role as usize - 1
}

/// Index of a [`Piece`] in `0..12` (white pieces first).
#[inline]
pub fn piece_index(piece: Piece) -> usize {
    role_index(piece.role) + if piece.color == Color::White { 0 } else { 6 }
}

/// Index of a [`Color`] (`White = 0`).
#[inline]
pub fn color_index(color: Color) -> usize {
    match color {
        Color::White => 0,
        Color::Black => 1,
    }
}
