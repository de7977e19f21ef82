//! Engine-level errors.

/// Errors from engine configuration and thread management.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No option with this name exists.
    #[error("unknown option: {name}")]
    UnknownOption { name: String },

    /// The value could not be parsed for the option's type.
    #[error("invalid value \"{value}\" for option {name}")]
    InvalidValue { name: &'static str, value: String },

    /// A numeric value outside the option's range.
    #[error("value {value} for option {name} is outside {min}..={max}")]
    OutOfRange {
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// The OS refused to start a search thread.
    #[error("failed to spawn search thread {index}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}
