//! Exclude patterns
//!
//! A narrow gitignore subset, anchored at the path start: `*` matches
//! within one segment, `**` spans segments, everything else is literal.
//! Patterns are compiled once per settings load; invalid patterns are
//! logged and skipped rather than failing the scan.

use glob::{MatchOptions, Pattern};
use tracing::{debug, warn};

use vaultsync_core::VaultPath;

/// Compiled set of exclude patterns
#[derive(Debug, Default)]
pub struct ExcludeSet {
    patterns: Vec<Pattern>,
}

impl ExcludeSet {
    /// Compile a list of pattern strings. Invalid patterns are skipped.
    #[must_use]
    pub fn new(patterns: &[String]) -> Self {
        let compiled: Vec<Pattern> = patterns
            .iter()
            .filter_map(|raw| match Pattern::new(raw) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    warn!(pattern = %raw, error = %err, "Skipping invalid exclude pattern");
                    None
                }
            })
            .collect();

        debug!(count = compiled.len(), "Exclude patterns compiled");
        Self { patterns: compiled }
    }

    /// Whether `path` matches any pattern
    #[must_use]
    pub fn is_excluded(&self, path: &VaultPath) -> bool {
        // Literal separators keep `*` inside one segment; `**` still spans.
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        self.patterns
            .iter()
            .any(|pattern| pattern.matches_with(path.as_str(), options))
    }

    /// Number of compiled patterns
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no patterns are active
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
