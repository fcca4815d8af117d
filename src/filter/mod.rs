pub mod overrides;

pub use overrides::LevelOverrideTable;

use crate::domain::{LogEvent, LogLevel};

/// Per-namespace minimum-severity gate.
///
/// `is_enabled` is meant to be called before an event is built, so a disabled
/// call site only pays for a comparison.
#[derive(Debug, Clone, Default)]
pub struct LevelFilter {
    table: LevelOverrideTable,
}

impl LevelFilter {
    pub fn new(table: LevelOverrideTable) -> Self {
        Self { table }
    }

    #[inline]
    pub fn is_enabled(&self, source_context: &str, level: LogLevel) -> bool {
        if level < self.table.floor() {
            return false;
        }
        level >= self.table.lookup(source_context)
    }

    pub fn admits(&self, event: &LogEvent) -> bool {
        self.is_enabled(event.source_context(), event.level())
    }

    pub fn table(&self) -> &LevelOverrideTable {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_below_floor_without_lookup() {
        let filter = LevelFilter::new(LevelOverrideTable::with_default(LogLevel::Warning));
        assert!(!filter.is_enabled("Anything", LogLevel::Information));
        assert!(filter.is_enabled("Anything", LogLevel::Warning));
    }
}
