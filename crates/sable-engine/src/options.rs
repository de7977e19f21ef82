//! Engine options consumed when a search starts.

use std::time::Duration;

use crate::error::EngineError;

/// Configuration snapshot. The pool copies it at the start of every search,
/// so changing options never affects a running search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Search threads, main thread included.
    pub threads: usize,
    /// Transposition table size in megabytes.
    pub hash_mb: usize,
    /// Number of principal variations searched and reported.
    pub multi_pv: usize,
    /// Time reserved per move for communication lag.
    pub move_overhead: Duration,
    /// Whether the caller ponders; lets time management think a bit longer.
    pub ponder: bool,
    /// Draw score penalty in centipawns for the side to move at the root.
    pub contempt: i32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            hash_mb: 16,
            multi_pv: 1,
            move_overhead: Duration::from_millis(10),
            ponder: false,
            contempt: 0,
        }
    }
}

/// Name, minimum and maximum of every numeric option.
const RANGES: [(&str, i64, i64); 5] = [
    ("Threads", 1, 1024),
    ("Hash", 1, 65_536),
    ("MultiPV", 1, 256),
    ("Move Overhead", 0, 5_000),
    ("Contempt", -100, 100),
];

impl EngineOptions {
    /// Set an option by its display name (case-insensitive), validating the
    /// value against the option's type and range.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        if name.eq_ignore_ascii_case("Ponder") {
            self.ponder = match value.trim().to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                _ => {
                    return Err(EngineError::InvalidValue {
                        name: "Ponder",
                        value: value.to_string(),
                    });
                }
            };
            return Ok(());
        }

        let Some(&(canonical, min, max)) = RANGES.iter().find(|(n, _, _)| n.eq_ignore_ascii_case(name)) else {
            return Err(EngineError::UnknownOption { name: name.to_string() });
        };
        let parsed: i64 = value.trim().parse().map_err(|_| EngineError::InvalidValue {
            name: canonical,
            value: value.to_string(),
        })?;
        if !(min..=max).contains(&parsed) {
            return Err(EngineError::OutOfRange {
                name: canonical,
                value: parsed,
                min,
                max,
            });
        }

        // the range check above bounds every cast below
        match canonical {
            "Threads" => self.threads = parsed as usize,
            "Hash" => self.hash_mb = parsed as usize,
            "MultiPV" => self.multi_pv = parsed as usize,
            "Move Overhead" => self.move_overhead = Duration::from_millis(parsed as u64),
            _ => self.contempt = parsed as i32,
        }
        tracing::debug!(option = canonical, value = parsed, "option set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = EngineOptions::default();
        assert_eq!(options.threads, 1);
        assert_eq!(options.hash_mb, 16);
        assert_eq!(options.multi_pv, 1);
        assert!(!options.ponder);
    }

    #[test]
    fn set_numeric_options() {
        let mut options = EngineOptions::default();
        options.set("Threads", "4").unwrap();
        options.set("hash", "64").unwrap();
        options.set("MultiPV", "3").unwrap();
        options.set("Move Overhead", "50").unwrap();
        options.set("Contempt", "-20").unwrap();
        assert_eq!(options.threads, 4);
        assert_eq!(options.hash_mb, 64);
        assert_eq!(options.multi_pv, 3);
        assert_eq!(options.move_overhead, Duration::from_millis(50));
        assert_eq!(options.contempt, -20);
    }

    #[test]
    fn set_ponder() {
        let mut options = EngineOptions::default();
        options.set("Ponder", "true").unwrap();
        assert!(options.ponder);
        assert!(matches!(
            options.set("Ponder", "yes"),
            Err(EngineError::InvalidValue { name: "Ponder", .. })
        ));
    }

    #[test]
    fn rejects_bad_values() {
        let mut options = EngineOptions::default();
        assert!(matches!(
            options.set("Threads", "0"),
            Err(EngineError::OutOfRange { name: "Threads", .. })
        ));
        assert!(matches!(
            options.set("Hash", "lots"),
            Err(EngineError::InvalidValue { name: "Hash", .. })
        ));
        assert!(matches!(options.set("Skill", "3"), Err(EngineError::UnknownOption { .. })));
        assert_eq!(options, EngineOptions::default(), "failed sets leave options untouched");
    }
}
