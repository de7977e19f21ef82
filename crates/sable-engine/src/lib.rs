//! Lazy-SMP search engine for sable.

pub mod error;
pub mod eval;
pub mod options;
pub mod search;
pub mod time;

pub use error::EngineError;
pub use eval::evaluate;
pub use options::EngineOptions;
pub use search::control::SearchControl;
pub use search::limits::SearchLimits;
pub use search::pool::ThreadPool;
pub use search::report::{IterationInfo, NoopListener, SearchListener, SearchResult, format_score};
pub use search::root_move::RootMove;
pub use search::worker::Worker;
pub use search::{Depth, Value};
