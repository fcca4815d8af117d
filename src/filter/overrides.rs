use crate::domain::LogLevel;

/// Namespace prefix → minimum level, resolved by longest matching prefix.
///
/// Built once and never mutated, so concurrent lookups need no locking.
#[derive(Debug, Clone)]
pub struct LevelOverrideTable {
    default_level: LogLevel,
    // Sorted by prefix length, longest first.
    overrides: Vec<(String, LogLevel)>,
    floor: LogLevel,
}

impl LevelOverrideTable {
    pub fn new<I, S>(default_level: LogLevel, overrides: I) -> Self
    where
        I: IntoIterator<Item = (S, LogLevel)>,
        S: Into<String>,
    {
        let mut rules: Vec<(String, LogLevel)> = Vec::new();
        for (prefix, level) in overrides {
            let prefix = prefix.into();
            let prefix = prefix.trim_end_matches('.').to_string();
            if prefix.is_empty() {
                continue;
            }
            // Last definition of a prefix wins.
            match rules.iter_mut().find(|(p, _)| *p == prefix) {
                Some(rule) => rule.1 = level,
                None => rules.push((prefix, level)),
            }
        }
        rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        let floor = rules
            .iter()
            .map(|(_, level)| *level)
            .fold(default_level, std::cmp::min);

        Self {
            default_level,
            overrides: rules,
            floor,
        }
    }

    pub fn with_default(default_level: LogLevel) -> Self {
        Self::new(default_level, std::iter::empty::<(String, LogLevel)>())
    }

    pub fn default_level(&self) -> LogLevel {
        self.default_level
    }

    /// Lowest level any rule admits.
    pub fn floor(&self) -> LogLevel {
        self.floor
    }

    pub fn overrides(&self) -> impl Iterator<Item = (&str, LogLevel)> {
        self.overrides.iter().map(|(p, l)| (p.as_str(), *l))
    }

    pub fn lookup(&self, source_context: &str) -> LogLevel {
        self.overrides
            .iter()
            .find(|(prefix, _)| matches_namespace(source_context, prefix))
            .map_or(self.default_level, |(_, level)| *level)
    }
}

impl Default for LevelOverrideTable {
    fn default() -> Self {
        Self::with_default(LogLevel::Information)
    }
}

/// `prefix` matches the namespace itself or any child of it, separated by
/// `.` or by `::` for Rust module paths.
fn matches_namespace(source_context: &str, prefix: &str) -> bool {
    match source_context.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.') || rest.starts_with("::"),
        None => false,
    }
}
