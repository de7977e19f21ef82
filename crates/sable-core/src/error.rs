//! Errors raised while setting up a root position.

/// Errors from FEN parsing and UCI move resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    /// The FEN string could not be parsed.
    #[error("invalid FEN \"{fen}\": {reason}")]
    InvalidFen {
        /// The offending FEN string.
        fen: String,
        /// Parser or validation message.
        reason: String,
    },

    /// A move string is not valid UCI notation.
    #[error("malformed UCI move: {uci_move}")]
    MalformedMove {
        /// The move string that failed to parse.
        uci_move: String,
    },

    /// A well-formed UCI move is not legal in the current position.
    #[error("illegal move {uci_move} at game ply {ply}")]
    IllegalMove {
        /// The move string.
        uci_move: String,
        /// Game ply of the position it was played in.
        ply: u32,
    },
}
