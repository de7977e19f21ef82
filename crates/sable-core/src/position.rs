//! Root and in-search position with make/unmake and repetition tracking.

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{Board, CastlingMode, Chess, Color, EnPassantMode, Move, MoveList, Piece};
use shakmaty::Position as _;
use tracing::trace;

use crate::error::PositionError;

/// FEN of the standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// State restored by [`Position::undo_move`].
#[derive(Clone)]
struct Undo {
    chess: Chess,
    plies_from_null: u32,
}

/// A chess position plus the key history needed for draw detection.
///
/// Moves are made and unmade in place. Every thread searches its own clone,
/// so nothing here is shared across threads.
#[derive(Clone)]
pub struct Position {
    chess: Chess,
    /// Zobrist key of every position since setup; the last one is current.
    keys: Vec<u64>,
    undo: Vec<Undo>,
    plies_from_null: u32,
}

impl Position {
    /// The standard starting position.
    pub fn startpos() -> Position {
        Position::from_chess(Chess::default())
    }

    /// Parse a FEN string.
    pub fn from_fen(fen: &str) -> Result<Position, PositionError> {
        let invalid = |reason: String| PositionError::InvalidFen {
            fen: fen.to_string(),
            reason,
        };
        let parsed: Fen = fen.trim().parse().map_err(|e| invalid(format!("{e}")))?;
        let chess: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| invalid(format!("{e}")))?;
        Ok(Position::from_chess(chess))
    }

    /// Build a root position from a FEN (or the start position) followed by
    /// a list of UCI moves. The played moves stay in the key history so the
    /// search sees repetitions through them.
    pub fn from_moves<S: AsRef<str>>(fen: Option<&str>, moves: &[S]) -> Result<Position, PositionError> {
        let mut pos = match fen {
            Some(fen) => Position::from_fen(fen)?,
            None => Position::startpos(),
        };
        for (i, uci) in moves.iter().enumerate() {
            let mv = pos
                .parse_uci(uci.as_ref())
                .inspect_err(|e| trace!(index = i, error = %e, "move list rejected"))?;
            pos.do_move(&mv);
        }
        pos.undo.clear();
        Ok(pos)
    }

    fn from_chess(chess: Chess) -> Position {
        let key = zobrist(&chess);
        Position {
            chess,
            keys: vec![key],
            undo: Vec::with_capacity(256),
            plies_from_null: 0,
        }
    }

    /// Resolve a UCI move string against this position.
    pub fn parse_uci(&self, uci: &str) -> Result<Move, PositionError> {
        let parsed: UciMove = uci.parse().map_err(|_| PositionError::MalformedMove {
            uci_move: uci.to_string(),
        })?;
        parsed.to_move(&self.chess).map_err(|_| PositionError::IllegalMove {
            uci_move: uci.to_string(),
            ply: self.game_ply(),
        })
    }

    /// UCI notation for a move.
    pub fn to_uci(mv: &Move) -> String {
        mv.to_uci(CastlingMode::Standard).to_string()
    }

    /// All legal moves.
    pub fn legal_moves(&self) -> MoveList {
        self.chess.legal_moves()
    }

    /// Underlying board.
    pub fn board(&self) -> &Board {
        self.chess.board()
    }

    /// Side to move.
    pub fn side_to_move(&self) -> Color {
        self.chess.turn()
    }

    /// Whether the side to move is in check.
    pub fn in_check(&self) -> bool {
        self.chess.is_check()
    }

    /// Whether `mv` checks the opponent.
    pub fn gives_check(&self, mv: &Move) -> bool {
        let mut child = self.chess.clone();
        child.play_unchecked(mv);
        child.is_check()
    }

    /// The piece `mv` moves (before promotion).
    pub fn moved_piece(&self, mv: &Move) -> Piece {
        Piece {
            color: self.side_to_move(),
            role: mv.role(),
        }
    }

    /// Whether `color` has any piece other than king and pawns.
    pub fn non_pawn_material(&self, color: Color) -> bool {
        let board = self.board();
        let pieces = board.by_color(color) & !board.pawns() & !board.kings();
        !pieces.is_empty()
    }

    /// Zobrist key of the current position.
    pub fn key(&self) -> u64 {
        self.keys[self.keys.len() - 1]
    }

    /// Hash of the pawn structure only.
    pub fn pawn_key(&self) -> u64 {
        let board = self.board();
        let white = (board.pawns() & board.white()).0;
        let black = (board.pawns() & board.black()).0;
        mix(white ^ mix(black ^ 0x9E37_79B9_7F4A_7C15))
    }

    /// Halfmove clock for the fifty-move rule.
    pub fn rule50(&self) -> u32 {
        self.chess.halfmoves()
    }

    /// Plies since the start of the game.
    pub fn game_ply(&self) -> u32 {
        let full = self.chess.fullmoves().get();
        (full - 1) * 2 + u32::from(self.side_to_move() == Color::Black)
    }

    /// Make a move. It must be legal.
    pub fn do_move(&mut self, mv: &Move) {
        self.undo.push(Undo {
            chess: self.chess.clone(),
            plies_from_null: self.plies_from_null,
        });
        self.chess.play_unchecked(mv);
        self.plies_from_null += 1;
        self.keys.push(zobrist(&self.chess));
    }

    /// Pass the turn. Returns `false` (leaving the position untouched) when
    /// passing is not possible, which only happens in check.
    pub fn do_null_move(&mut self) -> bool {
        let Ok(swapped) = self.chess.clone().swap_turn() else {
            return false;
        };
        self.undo.push(Undo {
            chess: std::mem::replace(&mut self.chess, swapped),
            plies_from_null: self.plies_from_null,
        });
        self.plies_from_null = 0;
        self.keys.push(zobrist(&self.chess));
        true
    }

    /// Take back the last [`do_move`](Self::do_move) or
    /// [`do_null_move`](Self::do_null_move).
    pub fn undo_move(&mut self) {
        if let Some(undo) = self.undo.pop() {
            self.chess = undo.chess;
            self.plies_from_null = undo.plies_from_null;
            self.keys.pop();
        }
    }

    /// Whether the position is drawn by the fifty-move rule, insufficient
    /// material or repetition. A single repetition counts once it happened
    /// within the last `ply` plies (inside the search tree); older history
    /// needs a threefold repetition.
    pub fn is_draw(&self, ply: usize) -> bool {
        if self.rule50() > 99 && (!self.in_check() || !self.legal_moves().is_empty()) {
            return true;
        }
        if self.chess.is_insufficient_material() {
            return true;
        }
        self.is_repetition(ply)
    }

    fn is_repetition(&self, ply: usize) -> bool {
        let n = self.keys.len();
        let current = self.keys[n - 1];
        let end = (self.rule50().min(self.plies_from_null) as usize).min(n - 1);
        let mut earlier = 0;
        let mut distance = 4;
        while distance <= end {
            if self.keys[n - 1 - distance] == current {
                if distance < ply {
                    return true;
                }
                earlier += 1;
                if earlier >= 2 {
                    return true;
                }
            }
            distance += 2;
        }
        false
    }

    /// Count leaf nodes of the legal move tree to `depth`.
    pub fn perft(&self, depth: u32) -> u64 {
        perft(&self.chess, depth)
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::startpos()
    }
}

impl std::fmt::Debug for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Position")
            .field("key", &format_args!("{:#018x}", self.key()))
            .field("game_ply", &self.game_ply())
            .field("history", &self.keys.len())
            .finish()
    }
}

fn zobrist(chess: &Chess) -> u64 {
    let z: Zobrist64 = chess.zobrist_hash(EnPassantMode::Legal);
    z.0
}

fn perft(chess: &Chess, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }
    let moves = chess.legal_moves();
    if depth == 1 {
        return moves.len() as u64;
    }
    moves
        .iter()
        .map(|mv| {
            let mut child = chess.clone();
            child.play_unchecked(mv);
            perft(&child, depth - 1)
        })
        .sum()
}

/// SplitMix64 finaliser.
fn mix(mut x: u64) -> u64 {
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startpos_has_twenty_moves() {
        assert_eq!(Position::startpos().legal_moves().len(), 20);
    }

    #[test]
    fn perft_startpos() {
        let pos = Position::startpos();
        assert_eq!(pos.perft(1), 20);
        assert_eq!(pos.perft(2), 400);
        assert_eq!(pos.perft(3), 8_902);
    }

    #[test]
    fn do_undo_restores_key() {
        let mut pos = Position::startpos();
        let key = pos.key();
        let mv = pos.parse_uci("e2e4").unwrap();
        pos.do_move(&mv);
        assert_ne!(pos.key(), key);
        pos.undo_move();
        assert_eq!(pos.key(), key);
        assert_eq!(pos.legal_moves().len(), 20);
    }

    #[test]
    fn null_move_round_trip() {
        let mut pos = Position::startpos();
        let key = pos.key();
        assert!(pos.do_null_move());
        assert_eq!(pos.side_to_move(), Color::Black);
        pos.undo_move();
        assert_eq!(pos.key(), key);
        assert_eq!(pos.side_to_move(), Color::White);
    }

    #[test]
    fn null_move_refused_in_check() {
        let mut pos = Position::from_fen("4k3/8/8/8/8/8/4q3/4K3 w - - 0 1").unwrap();
        assert!(pos.in_check());
        assert!(!pos.do_null_move());
    }

    #[test]
    fn repetition_inside_search_is_draw() {
        let mut pos = Position::startpos();
        for uci in ["g1f3", "g8f6", "f3g1", "f6g8"] {
            let mv = pos.parse_uci(uci).unwrap();
            pos.do_move(&mv);
        }
        assert!(pos.is_draw(8), "twofold repetition within the tree is a draw");
        assert!(!pos.is_draw(2), "a single repetition before the root is not");
    }

    #[test]
    fn threefold_before_root_is_draw() {
        let moves = [
            "g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8",
        ];
        let pos = Position::from_moves(None, &moves).unwrap();
        assert!(pos.is_draw(0));
    }

    #[test]
    fn fifty_move_rule() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/4R3/4K3 w - - 100 80").unwrap();
        assert!(pos.is_draw(0));
    }

    #[test]
    fn insufficient_material_is_draw() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        assert!(pos.is_draw(0));
    }

    #[test]
    fn gives_check_detects_checks() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 0 1").unwrap();
        let check = pos.parse_uci("a1a8").unwrap();
        let quiet = pos.parse_uci("a1b1").unwrap();
        assert!(pos.gives_check(&check));
        assert!(!pos.gives_check(&quiet));
    }

    #[test]
    fn pawn_key_ignores_pieces() {
        let a = Position::from_fen("4k3/pppp4/8/8/8/8/PPPP4/4K3 w - - 0 1").unwrap();
        let b = Position::from_fen("3qk3/pppp4/8/8/8/8/PPPP4/3QK3 w - - 0 1").unwrap();
        let c = Position::from_fen("4k3/ppp5/8/8/8/8/PPPP4/4K3 w - - 0 1").unwrap();
        assert_eq!(a.pawn_key(), b.pawn_key());
        assert_ne!(a.pawn_key(), c.pawn_key());
    }

    #[test]
    fn game_ply_counts_both_sides() {
        let pos = Position::from_moves(None, &["e2e4", "e7e5", "g1f3"]).unwrap();
        assert_eq!(pos.game_ply(), 3);
    }

    #[test]
    fn bad_inputs_are_errors() {
        assert!(matches!(
            Position::from_fen("not a fen"),
            Err(PositionError::InvalidFen { .. })
        ));
        let pos = Position::startpos();
        assert!(matches!(pos.parse_uci("zz"), Err(PositionError::MalformedMove { .. })));
        assert!(matches!(pos.parse_uci("e2e5"), Err(PositionError::IllegalMove { .. })));
    }
}
