// SPDX-License-Identifier: GPL-3.0-or-later
use moka::sync::Cache;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

const DEFAULT_CAPACITY: u64 = 10_000;

/// Compiled condition patterns keyed by `(pattern, case_insensitive)`.
///
/// Shared across evaluations. Eviction only costs a recompile.
#[derive(Clone)]
pub struct PatternCache {
    cache: Cache<(String, bool), Regex>,
}

impl PatternCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::new(capacity),
        }
    }

    pub fn get(&self, pattern: &str, case_insensitive: bool) -> Result<Regex, Arc<regex::Error>> {
        self.cache
            .try_get_with((pattern.to_string(), case_insensitive), || {
                RegexBuilder::new(pattern)
                    .case_insensitive(case_insensitive)
                    .build()
            })
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for PatternCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}
